use crate::context::{CancellationToken, RequestContext};
use crate::degradation::{DegradationController, DegradationTrigger};
use crate::metrics::EngineMetrics;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use strata_capability::{CapabilityProvider, CapabilityRegistry, CapabilityRequest};
use strata_core::{ExecutionHistory, ExecutionRecord, ExecutionStatus, StrataResult};
use strata_plan::{DependencyGraph, ExecutionPlan};
use strata_policy::CoordinatorConfig;
use strata_store::{ConsolidationStore, ConsolidationUpdate, DecisionLog};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{info, warn};
use uuid::Uuid;

/// Result of dispatching a full plan (or as much of it as ran).
pub(crate) struct DispatchOutcome {
    /// Output per succeeded task.
    pub outputs: HashMap<Uuid, String>,
    /// Terminally failed tasks and their last error.
    pub failed: Vec<(Uuid, String)>,
    /// Whether the caller cancelled mid-flight.
    pub cancelled: bool,
    /// Successful capability invocations recorded.
    pub successful_invocations: u32,
    /// Degradation notifications the caller must see.
    pub notifications: Vec<String>,
}

enum RunOutcome {
    Succeeded(String),
    Failed(String),
    Cancelled,
}

struct TaskRun {
    task_id: Uuid,
    capability_id: String,
    outcome: RunOutcome,
    attempts: u32,
    failed_attempts: u32,
    timeout_count: u32,
    last_timed_out: bool,
    last_error: Option<String>,
    tokens_used: u64,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
}

/// Dispatches a plan stage by stage.
///
/// Each stage's tasks fan out as independent concurrent units (bounded
/// by the worker pool) and are joined before the next stage proceeds —
/// no task in stage N+1 starts before all of stage N has resolved. A
/// terminal task failure stops the plan and escalates to the
/// degradation controller rather than silently continuing.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn run_plan(
    graph: &DependencyGraph,
    plan: &ExecutionPlan,
    registry: &CapabilityRegistry,
    ctx: &RequestContext,
    coordinator: &CoordinatorConfig,
    controller: &DegradationController,
    store: &ConsolidationStore,
    log: &DecisionLog,
    metrics: &EngineMetrics,
    history: &mut ExecutionHistory,
    extra_hints: &HashMap<String, String>,
) -> StrataResult<DispatchOutcome> {
    let semaphore = Arc::new(Semaphore::new(coordinator.max_parallel_tasks));
    let invocation_timeout = std::time::Duration::from_secs(coordinator.invocation_timeout_secs);

    let mut outcome = DispatchOutcome {
        outputs: HashMap::new(),
        failed: Vec::new(),
        cancelled: false,
        successful_invocations: 0,
        notifications: Vec::new(),
    };

    for (stage_index, stage) in plan.stages.iter().enumerate() {
        if ctx.cancel.is_cancelled() {
            outcome.cancelled = true;
            mark_cancelled(history, stage);
            continue;
        }
        if !outcome.failed.is_empty() || outcome.cancelled {
            // A failed stage stops the plan; later stages never start.
            break;
        }

        info!(
            request_id = %ctx.request.id,
            stage = stage_index,
            tasks = stage.len(),
            "Dispatching stage"
        );

        let mut join_set: JoinSet<TaskRun> = JoinSet::new();
        for task_id in stage {
            let task = graph.get(*task_id).ok_or_else(|| {
                strata_core::StrataError::Decomposition(format!(
                    "Plan references unknown task {task_id}"
                ))
            })?;
            let provider = registry.resolve(&task.required_capability)?;

            let mut hints = extra_hints.clone();
            for dep in &task.depends_on {
                if let Some(output) = outcome.outputs.get(dep) {
                    hints.insert(format!("dependency:{dep}"), output.clone());
                }
            }
            let request = CapabilityRequest {
                capability_id: task.required_capability.clone(),
                task_id: task.id,
                task_description: task.description.clone(),
                context_hints: hints,
                model_hint: ctx.profile.default_model_tier,
            };

            let mut record = ExecutionRecord::pending(task.id);
            record.status = ExecutionStatus::Running;
            record.started_at = Some(Utc::now());
            history.push(record);

            let capability_id = task.required_capability.clone();
            let cancel = ctx.cancel.clone();
            let semaphore = semaphore.clone();
            let max_attempts = coordinator.max_attempts;
            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                run_task(
                    request,
                    provider,
                    capability_id,
                    cancel,
                    max_attempts,
                    invocation_timeout,
                )
                .await
            });
        }

        // Fan-in: the stage barrier. Nothing below runs until every
        // task in this stage has resolved.
        while let Some(joined) = join_set.join_next().await {
            let run = match joined {
                Ok(run) => run,
                Err(e) => {
                    warn!(error = %e, "Dispatched task panicked");
                    continue;
                }
            };
            record_run(
                run,
                ctx,
                controller,
                store,
                log,
                metrics,
                history,
                &mut outcome,
            );
        }
    }

    Ok(outcome)
}

async fn run_task(
    request: CapabilityRequest,
    provider: Arc<dyn CapabilityProvider>,
    capability_id: String,
    mut cancel: CancellationToken,
    max_attempts: u32,
    invocation_timeout: std::time::Duration,
) -> TaskRun {
    let started_at = Utc::now();
    let task_id = request.task_id;
    let mut attempts = 0u32;
    let mut failed_attempts = 0u32;
    let mut timeout_count = 0u32;
    let mut last_timed_out = false;
    let mut last_error: Option<String> = None;
    let mut tokens_used = 0u64;

    let outcome = loop {
        if cancel.is_cancelled() {
            break RunOutcome::Cancelled;
        }
        attempts += 1;

        let attempt = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = timeout(invocation_timeout, provider.invoke(request.clone())) => Some(result),
        };

        match attempt {
            None => break RunOutcome::Cancelled,
            Some(Err(_elapsed)) => {
                // Timed out: the in-flight invocation is dropped
                // (cancelled) and the attempt counts as a failure.
                failed_attempts += 1;
                timeout_count += 1;
                last_timed_out = true;
                last_error = Some(format!(
                    "invocation timed out after {}s",
                    invocation_timeout.as_secs()
                ));
            }
            Some(Ok(Err(e))) => {
                failed_attempts += 1;
                last_timed_out = false;
                last_error = Some(e.to_string());
            }
            Some(Ok(Ok(response))) => {
                tokens_used += response.tokens_used;
                if response.is_ok() {
                    break RunOutcome::Succeeded(response.output);
                }
                failed_attempts += 1;
                last_timed_out = false;
                last_error = response.error.or_else(|| Some("capability error".to_string()));
            }
        }

        if attempts >= max_attempts {
            break RunOutcome::Failed(
                last_error
                    .clone()
                    .unwrap_or_else(|| "capability failed".to_string()),
            );
        }
    };

    TaskRun {
        task_id,
        capability_id,
        outcome,
        attempts,
        failed_attempts,
        timeout_count,
        last_timed_out,
        last_error,
        tokens_used,
        started_at,
        finished_at: Utc::now(),
    }
}

#[allow(clippy::too_many_arguments)]
fn record_run(
    run: TaskRun,
    ctx: &RequestContext,
    controller: &DegradationController,
    store: &ConsolidationStore,
    log: &DecisionLog,
    metrics: &EngineMetrics,
    history: &mut ExecutionHistory,
    outcome: &mut DispatchOutcome,
) {
    for _ in 0..run.attempts {
        metrics.invocation();
    }
    for _ in 1..run.attempts {
        metrics.retry();
    }
    for _ in 0..run.timeout_count {
        metrics.timeout();
    }
    for _ in 0..run.failed_attempts {
        store.record(ConsolidationUpdate::CapabilityOutcome {
            capability_id: run.capability_id.clone(),
            success: false,
        });
    }

    // Budget accounting happens on the coordinator side so threshold
    // escalations are serialized with the rest of the bookkeeping.
    for crossed in ctx.budget.charge(run.tokens_used) {
        metrics.degradation();
        let esc = controller.escalate(
            DegradationTrigger::BudgetThreshold(crossed.percent),
            ctx.trust,
            ctx.request.id,
            log,
        );
        if esc.notify {
            outcome.notifications.push(format!(
                "resource budget crossed {}%, degraded {} -> {}",
                crossed.percent, esc.from, esc.to
            ));
        }
    }

    if run.failed_attempts > 0 && !matches!(run.outcome, RunOutcome::Failed(_)) {
        let mut retried = ExecutionRecord::pending(run.task_id);
        retried.status = ExecutionStatus::Retried;
        retried.attempts = run.attempts;
        retried.last_error = run.last_error.clone();
        retried.started_at = Some(run.started_at);
        history.push(retried);
    }

    let mut record = ExecutionRecord::pending(run.task_id);
    record.attempts = run.attempts;
    record.started_at = Some(run.started_at);
    record.finished_at = Some(run.finished_at);
    record.last_error = run.last_error.clone();

    match run.outcome {
        RunOutcome::Succeeded(output) => {
            record.status = ExecutionStatus::Succeeded;
            record.last_error = None;
            history.push(record);
            store.record(ConsolidationUpdate::CapabilityOutcome {
                capability_id: run.capability_id.clone(),
                success: true,
            });
            outcome.successful_invocations += 1;
            outcome.outputs.insert(run.task_id, output);
        }
        RunOutcome::Failed(error) => {
            record.status = ExecutionStatus::Failed;
            history.push(record);
            warn!(
                task_id = %run.task_id,
                capability = %run.capability_id,
                attempts = run.attempts,
                error = %error,
                "Task failed terminally, escalating"
            );
            if let Some(esc) = controller.task_failed(
                run.failed_attempts,
                run.last_timed_out,
                ctx.trust,
                ctx.request.id,
                log,
            ) {
                metrics.degradation();
                if esc.notify {
                    outcome.notifications.push(format!(
                        "capability '{}' failed terminally, degraded {} -> {}",
                        run.capability_id, esc.from, esc.to
                    ));
                }
                if esc.terminal {
                    outcome
                        .notifications
                        .push("degradation ladder exhausted; retry later".to_string());
                }
            }
            outcome.failed.push((run.task_id, error));
        }
        RunOutcome::Cancelled => {
            record.status = ExecutionStatus::Cancelled;
            history.push(record);
            outcome.cancelled = true;
        }
    }
}

fn mark_cancelled(history: &mut ExecutionHistory, stage: &[Uuid]) {
    for task_id in stage {
        let mut record = ExecutionRecord::pending(*task_id);
        record.status = ExecutionStatus::Cancelled;
        record.finished_at = Some(Utc::now());
        history.push(record);
    }
}
