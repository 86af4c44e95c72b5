use crate::context::{CancellationToken, RequestContext};
use crate::degradation::DegradationController;
use crate::dispatch::run_plan;
use crate::metrics::EngineMetrics;
use crate::report::{EngineOutcome, OrchestrationReport, Verdict};
use crate::validation::{ValidationInput, ValidationPipeline, ValidationReport};
use chrono::Utc;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use strata_capability::CapabilityRegistry;
use strata_classify::{Classifier, ClassifierConfig};
use strata_core::{
    ExecutionHistory, ExecutionRecord, ExecutionStatus, Request, StrataError, StrataResult,
    Tier, TokenBudget,
};
use strata_plan::{Decomposer, DependencyGraph, ExecutionPlan};
use strata_policy::{ConfigWatcher, PolicyTable, StrataConfig};
use strata_store::{
    pattern_signature, ConsolidationStore, ConsolidationUpdate, DecisionEntry, DecisionLog,
    RequestSummary, TrustManager,
};
use tracing::{info, warn};
use uuid::Uuid;

/// Config-derived state, rebuilt atomically on every hot reload.
struct EngineInner {
    config: StrataConfig,
    classifier: Arc<Classifier>,
    table: PolicyTable,
}

impl EngineInner {
    fn build(config: StrataConfig) -> StrataResult<Self> {
        config.validate()?;
        let table = config.policy_table()?;
        let classifier = Arc::new(Classifier::new(
            config.classifier.priority_vocabulary.clone(),
            ClassifierConfig {
                max_retries: config.classifier.max_retries,
                backoff_base: std::time::Duration::from_millis(config.classifier.backoff_base_ms),
            },
        )?);
        Ok(Self {
            config,
            classifier,
            table,
        })
    }
}

/// The adaptive task-orchestration engine.
///
/// Classifies each request, selects an execution tier, decomposes into
/// a staged plan, dispatches across the capability registry, validates
/// through quality gates, and degrades along the five-level ladder when
/// providers fail or the budget runs out.
pub struct Engine {
    inner: RwLock<EngineInner>,
    registry: Arc<CapabilityRegistry>,
    decomposer: Decomposer,
    store: Arc<ConsolidationStore>,
    log: Arc<DecisionLog>,
    trust: Arc<TrustManager>,
    controllers: tokio::sync::Mutex<HashMap<Uuid, Arc<DegradationController>>>,
    pipeline: ValidationPipeline,
    metrics: Arc<EngineMetrics>,
}

impl Engine {
    /// Creates an engine over a validated config and a populated
    /// registry, opening its stores under `data_dir`.
    pub async fn new(
        config: StrataConfig,
        registry: Arc<CapabilityRegistry>,
        data_dir: PathBuf,
    ) -> StrataResult<Self> {
        let inner = EngineInner::build(config)?;
        let store = Arc::new(ConsolidationStore::open(data_dir.join("consolidation")).await?);
        let log = Arc::new(DecisionLog::open(data_dir.join("decisions")).await?);
        let trust = Arc::new(TrustManager::open(data_dir.join("trust")).await?);
        let decomposer = Decomposer::new(registry.clone(), store.clone())?;

        Ok(Self {
            inner: RwLock::new(inner),
            registry,
            decomposer,
            store,
            log,
            trust,
            controllers: tokio::sync::Mutex::new(HashMap::new()),
            pipeline: ValidationPipeline::with_defaults()?,
            metrics: Arc::new(EngineMetrics::new()),
        })
    }

    /// Replaces the validation pipeline, builder-style.
    pub fn with_pipeline(mut self, pipeline: ValidationPipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// The consolidation store.
    pub fn store(&self) -> &Arc<ConsolidationStore> {
        &self.store
    }

    /// The decision log.
    pub fn decision_log(&self) -> &Arc<DecisionLog> {
        &self.log
    }

    /// The trust manager — the only writer of trust state.
    pub fn trust_manager(&self) -> &Arc<TrustManager> {
        &self.trust
    }

    /// Engine counters.
    pub fn metrics(&self) -> &Arc<EngineMetrics> {
        &self.metrics
    }

    /// Snapshot of the active config.
    pub fn config(&self) -> StrataConfig {
        self.read_inner().0
    }

    /// Validates and activates a new config. Invalid documents are
    /// rejected and the active config stays in force.
    pub fn apply_config(&self, config: StrataConfig) -> StrataResult<()> {
        let inner = EngineInner::build(config)?;
        match self.inner.write() {
            Ok(mut guard) => {
                *guard = inner;
                info!("Engine config activated");
                Ok(())
            }
            Err(_) => Err(StrataError::Config(
                "Engine config lock poisoned".to_string(),
            )),
        }
    }

    /// Starts watching a TOML config file, hot-applying every valid
    /// change. Keep the returned watcher alive for as long as reloads
    /// should happen.
    pub fn start_config_watcher(
        self: &Arc<Self>,
        path: PathBuf,
        debounce_ms: u64,
    ) -> StrataResult<ConfigWatcher> {
        let engine = Arc::clone(self);
        ConfigWatcher::start(path, debounce_ms, move |config| {
            if let Err(e) = engine.apply_config(config) {
                warn!(error = %e, "Hot-reloaded config rejected");
            }
        })
    }

    /// The per-session degradation controller, created at `L1` on first
    /// use. Only this controller ever writes the session's state.
    pub async fn controller_for(&self, session_id: Uuid) -> Arc<DegradationController> {
        let mut controllers = self.controllers.lock().await;
        controllers
            .entry(session_id)
            .or_insert_with(|| {
                Arc::new(DegradationController::new(
                    self.read_inner().0.degradation.clone(),
                ))
            })
            .clone()
    }

    /// Spawns the session's periodic recovery loop at the configured
    /// interval. Recovery is the only path by which degradation ever
    /// improves; abort the returned handle to stop checking.
    pub async fn start_recovery_loop(&self, session_id: Uuid) -> tokio::task::JoinHandle<()> {
        let controller = self.controller_for(session_id).await;
        controller.spawn_recovery_loop(self.log.clone())
    }

    fn read_inner(&self) -> (StrataConfig, Arc<Classifier>, PolicyTable) {
        match self.inner.read() {
            Ok(guard) => (
                guard.config.clone(),
                guard.classifier.clone(),
                guard.table.clone(),
            ),
            Err(poisoned) => {
                let guard = poisoned.into_inner();
                (
                    guard.config.clone(),
                    guard.classifier.clone(),
                    guard.table.clone(),
                )
            }
        }
    }

    /// Processes a request end to end.
    pub async fn submit(&self, request: Request) -> StrataResult<EngineOutcome> {
        self.run_request(request, CancellationToken::never(), false)
            .await
    }

    /// Processes a request with a caller-held cancellation token.
    pub async fn submit_cancellable(
        &self,
        request: Request,
        cancel: CancellationToken,
    ) -> StrataResult<EngineOutcome> {
        self.run_request(request, cancel, false).await
    }

    /// Consumer-side direct execution: a single capability invocation
    /// bypassing staged coordination.
    ///
    /// Classification still runs — it is never skippable — and any tier
    /// above trivial rejects the bypass as a fatal policy violation
    /// rather than silently correcting it.
    pub async fn execute_direct(&self, request: Request) -> StrataResult<EngineOutcome> {
        self.run_request(request, CancellationToken::never(), true)
            .await
    }

    async fn run_request(
        &self,
        request: Request,
        cancel: CancellationToken,
        force_direct: bool,
    ) -> StrataResult<EngineOutcome> {
        let (config, classifier, table) = self.read_inner();

        // Classification is the one stage every path goes through.
        let classification = classifier.classify(&request).await;
        self.store.record(ConsolidationUpdate::pattern_observed(
            pattern_signature(&request.payload),
        ));

        // Low confidence: do not execute, ask the caller instead.
        if classification.confidence < config.confidence.clarify_below {
            self.metrics.request_rejected();
            info!(
                request_id = %request.id,
                confidence = classification.confidence,
                "Confidence below execution threshold, asking for clarification"
            );
            return Ok(EngineOutcome::NeedsClarification {
                confidence: classification.confidence,
                message: "request is too ambiguous to execute; please clarify intent and scope"
                    .to_string(),
            });
        }
        let uncertainty_flagged = classification.confidence < config.confidence.flag_below;

        let tier = table.tier_for(classification.complexity_score, &classification.priority_tags);
        let profile = *table.profile(tier);
        self.log.log(DecisionEntry::new(
            request.id,
            "unclassified",
            tier.to_string(),
            "tier_selected",
            format!(
                "complexity {}, confidence {}",
                classification.complexity_score, classification.confidence
            ),
        ));

        if force_direct && !profile.allowed_direct_execution {
            self.metrics.request_rejected();
            return Err(StrataError::Policy(format!(
                "direct execution is not permitted under tier {tier}; route through the coordinator"
            )));
        }

        // Immutable snapshots for the lifetime of this request.
        let trust = self.trust.get(request.session_id).await?.trust_level;
        let controller = self.controller_for(request.session_id).await;
        let degradation_at_start = controller.snapshot();
        let budget = Arc::new(TokenBudget::new(
            config.budget.token_limit,
            config.degradation.budget_thresholds.clone(),
        ));

        // Trivial requests skip decomposition: one dependency-free task.
        let direct_execution = tier == Tier::Trivial;
        let graph = if direct_execution {
            let mut graph = DependencyGraph::new();
            graph.add(self.decomposer.direct_task(&request)?);
            graph
        } else {
            match self.decomposer.decompose(&request, tier, &profile) {
                Ok(graph) => graph,
                Err(e) => {
                    self.metrics.request_rejected();
                    return Err(e);
                }
            }
        };
        let plan = ExecutionPlan::from_graph(&graph)?;

        info!(
            request_id = %request.id,
            tier = %tier,
            strategy = %plan.strategy,
            stages = plan.stages.len(),
            tasks = plan.task_count(),
            "Plan ready"
        );

        let ctx = RequestContext {
            request: request.clone(),
            classification,
            tier,
            profile,
            trust,
            degradation_at_start,
            budget,
            cancel,
        };

        let mut history = ExecutionHistory::new();
        for task in graph.tasks() {
            history.push(ExecutionRecord::pending(task.id));
        }

        // Dispatch, then validate; a required-gate failure feeds the
        // detail back into a bounded reflection loop.
        let mut hints: HashMap<String, String> = HashMap::new();
        let mut reflection_cycles = 0u32;
        let (outcome, validation): (_, Option<ValidationReport>) = loop {
            let outcome = run_plan(
                &graph,
                &plan,
                &self.registry,
                &ctx,
                &config.coordinator,
                &controller,
                &self.store,
                &self.log,
                &self.metrics,
                &mut history,
                &hints,
            )
            .await?;

            if outcome.cancelled || !outcome.failed.is_empty() {
                break (outcome, None);
            }

            let input = ValidationInput {
                payload: request.payload.clone(),
                outputs: outcome.outputs.clone(),
                task_count: graph.len(),
            };
            let report = self.pipeline.run(&input).await?;
            if report.passed {
                break (outcome, Some(report));
            }
            for _ in report.failed_gates() {
                self.metrics.gate_failure();
            }
            if reflection_cycles >= config.validation.max_reflection_cycles {
                warn!(
                    request_id = %request.id,
                    cycles = reflection_cycles,
                    "Reflection budget exhausted, validation failure is terminal"
                );
                break (outcome, Some(report));
            }
            reflection_cycles += 1;
            info!(
                request_id = %request.id,
                cycle = reflection_cycles,
                detail = %report.failure_detail(),
                "Required gate failed, reflecting"
            );
            hints.insert("validation_feedback".to_string(), report.failure_detail());
        };

        if outcome.cancelled {
            self.metrics.cancellation();
        }

        let passed = validation.as_ref().map(|v| v.passed).unwrap_or(false)
            && outcome.failed.is_empty()
            && !outcome.cancelled;
        let verdict = if passed { Verdict::Pass } else { Verdict::Fail };

        let succeeded = history.count_with_status(&ExecutionStatus::Succeeded) as u32;
        let failed = history.count_with_status(&ExecutionStatus::Failed) as u32;
        let degradation_level = controller.level().as_u8();

        let summary = if outcome.cancelled {
            format!(
                "Request cancelled by caller: {succeeded}/{} tasks finished first",
                graph.len()
            )
        } else {
            format!(
                "Orchestration {}: {succeeded}/{} tasks succeeded, {failed} failed, degradation l{degradation_level}",
                if passed { "passed" } else { "failed" },
                graph.len()
            )
        };

        self.store
            .record(ConsolidationUpdate::RequestCompleted(RequestSummary {
                request_id: request.id,
                session_id: request.session_id,
                tier,
                strategy: plan.strategy.to_string(),
                succeeded,
                failed,
                degradation_level,
                completed_at: Utc::now(),
            }));
        self.metrics.request_completed();

        let (gates, failed_gates) = match &validation {
            Some(report) => (report.gates.clone(), report.failed_gates()),
            None => (Vec::new(), Vec::new()),
        };

        Ok(EngineOutcome::Completed(OrchestrationReport {
            request_id: request.id,
            tier,
            strategy: plan.strategy,
            stages: plan.stages.clone(),
            verdict,
            uncertainty_flagged,
            direct_execution,
            cancelled: outcome.cancelled,
            summary,
            history,
            gates,
            failed_gates,
            failed_tasks: outcome.failed,
            degradation_level,
            notifications: outcome.notifications,
            outputs: outcome.outputs,
            successful_invocations: outcome.successful_invocations,
            reflection_cycles,
        }))
    }
}
