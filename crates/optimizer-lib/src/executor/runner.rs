//! Sequential plan execution

use super::ActionApplier;
use crate::error::OptimizerError;
use crate::health::{components, HealthRegistry};
use crate::history::{ActionRecord, HistoryEntry, HistoryStore};
use crate::models::{ActionStatus, Component, OptimizationAction};
use crate::observability::{OptimizerMetrics, StructuredLogger};
use chrono::Utc;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error};

/// Pause between consecutive actions of a plan
pub const DEFAULT_ACTION_PACING: Duration = Duration::from_secs(1);

/// Runs optimization plans against live components
pub struct ActionExecutor {
    applier: Arc<dyn ActionApplier>,
    history: Arc<dyn HistoryStore>,
    /// One lock per component so actions on the same component never overlap
    locks: DashMap<Component, Arc<Mutex<()>>>,
    pacing: Duration,
    auto_execute: AtomicBool,
    health: HealthRegistry,
    metrics: OptimizerMetrics,
    logger: StructuredLogger,
}

impl ActionExecutor {
    pub fn new(
        applier: Arc<dyn ActionApplier>,
        history: Arc<dyn HistoryStore>,
        health: HealthRegistry,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            applier,
            history,
            locks: DashMap::new(),
            pacing: DEFAULT_ACTION_PACING,
            auto_execute: AtomicBool::new(true),
            health,
            metrics: OptimizerMetrics::new(),
            logger,
        }
    }

    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_auto_execute(self, enabled: bool) -> Self {
        self.auto_execute.store(enabled, Ordering::SeqCst);
        self
    }

    /// Whether scheduled cycles execute their plans
    pub fn auto_execute(&self) -> bool {
        self.auto_execute.load(Ordering::SeqCst)
    }

    pub fn set_auto_execute(&self, enabled: bool) {
        self.auto_execute.store(enabled, Ordering::SeqCst);
    }

    fn component_lock(&self, component: Component) -> Arc<Mutex<()>> {
        self.locks
            .entry(component)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Execute a plan in order, pausing between actions
    pub async fn execute_plan(&self, plan: Vec<OptimizationAction>) -> Vec<ActionRecord> {
        let mut records = Vec::with_capacity(plan.len());
        let total = plan.len();

        for (i, action) in plan.into_iter().enumerate() {
            records.push(self.execute(action).await);

            if i + 1 < total && !self.pacing.is_zero() {
                tokio::time::sleep(self.pacing).await;
            }
        }

        records
    }

    /// Execute one action through to a terminal state
    pub async fn execute(&self, mut action: OptimizationAction) -> ActionRecord {
        let component = action.component();
        let lock = self.component_lock(component);
        let _guard = lock.lock().await;

        let started_at = Utc::now();
        action.status = ActionStatus::Executing;
        debug!(action_id = %action.id, component = %component, "Executing action");

        let mut error = None;
        let mut rollback_attempted = false;
        let mut rollback_error = None;

        let status = match self.applier.capture(component).await {
            Err(e) => {
                error = Some(
                    OptimizerError::ActionExecution {
                        action_id: action.id.clone(),
                        component,
                        reason: format!("capturing rollback state failed: {:#}", e),
                    }
                    .to_string(),
                );
                ActionStatus::Failed
            }
            Ok(captured) => {
                action.rollback_data = captured;

                match self.applier.apply(&action.params).await {
                    Ok(()) => ActionStatus::Completed,
                    Err(e) => {
                        error = Some(
                            OptimizerError::ActionExecution {
                                action_id: action.id.clone(),
                                component,
                                reason: format!("{:#}", e),
                            }
                            .to_string(),
                        );

                        match action.rollback_data.clone() {
                            None => ActionStatus::Failed,
                            Some(state) => {
                                action.status = ActionStatus::RollingBack;
                                rollback_attempted = true;

                                match self.applier.restore(&state).await {
                                    Ok(()) => ActionStatus::RolledBack,
                                    Err(e) => {
                                        let err = OptimizerError::Rollback {
                                            action_id: action.id.clone(),
                                            reason: format!("{:#}", e),
                                        };
                                        self.escalate(&action, &err).await;
                                        rollback_error = Some(err.to_string());
                                        ActionStatus::RollbackFailed
                                    }
                                }
                            }
                        }
                    }
                }
            }
        };

        action.status = status;
        let record = ActionRecord {
            action,
            status,
            error,
            rollback_attempted,
            rollback_error,
            started_at,
            finished_at: Utc::now(),
        };

        self.record(&record).await;
        record
    }

    async fn escalate(&self, action: &OptimizationAction, err: &OptimizerError) {
        if err.requires_escalation() {
            self.logger
                .log_rollback_escalation(&action.id, action.component().as_str(), &err.to_string());
            self.health
                .set_degraded(components::EXECUTOR, err.to_string())
                .await;
        }
    }

    async fn record(&self, record: &ActionRecord) {
        self.metrics.record_action_outcome(record.status);
        self.logger.log_action_outcome(record);

        if let Err(e) = self
            .history
            .append(HistoryEntry::Optimization(record.clone()))
            .await
        {
            let err = OptimizerError::History(format!("{:#}", e));
            error!(action_id = %record.action.id, error = %err, "Failed to append action outcome");
            self.health
                .set_degraded(components::EXECUTOR, err.to_string())
                .await;
        }
    }
}
