use crate::graph::DependencyGraph;
use crate::task::Task;
use regex::Regex;
use std::sync::Arc;
use strata_capability::CapabilityRegistry;
use strata_core::{Request, StrataError, StrataResult, Tier};
use strata_policy::TierProfile;
use tracing::debug;
use uuid::Uuid;

/// Read-only view of historical capability outcomes, used for
/// tie-breaking when a segment could map to multiple capabilities.
///
/// Implemented by the consolidation store; reads may be stale by design.
pub trait CapabilityStats: Send + Sync {
    /// Success rate in `[0, 1]` for a capability, if any history exists.
    fn success_rate(&self, capability_id: &str) -> Option<f64>;
}

/// Stats source with no history; every tie-break falls through to
/// specificity.
pub struct NoHistory;

impl CapabilityStats for NoHistory {
    fn success_rate(&self, _capability_id: &str) -> Option<f64> {
        None
    }
}

/// Splits a request into a task graph, resolving each task to exactly
/// one registered capability at decomposition time.
///
/// Tier-aware: the trivial tier yields a single task, the fast tier a
/// shallow chain of at most three, and standard and above split
/// recursively down to clause level. Sequential markers ("then",
/// sentence breaks) chain groups; conjunctions within a group become
/// parallel siblings.
pub struct Decomposer {
    registry: Arc<CapabilityRegistry>,
    stats: Arc<dyn CapabilityStats>,
    sequential_split: Regex,
    parallel_split: Regex,
}

/// Fast-tier decompositions never exceed this many tasks.
const FAST_TIER_MAX_TASKS: usize = 3;

impl Decomposer {
    /// Creates a decomposer over the given registry and history source.
    pub fn new(
        registry: Arc<CapabilityRegistry>,
        stats: Arc<dyn CapabilityStats>,
    ) -> StrataResult<Self> {
        let sequential_split = Regex::new(r"(?i)\band then\b|\bafter that\b|\bthen\b|;|\.\s+")
            .map_err(|e| StrataError::Decomposition(format!("Invalid split pattern: {e}")))?;
        let parallel_split = Regex::new(r"(?i)\band\b|,")
            .map_err(|e| StrataError::Decomposition(format!("Invalid split pattern: {e}")))?;
        Ok(Self {
            registry,
            stats,
            sequential_split,
            parallel_split,
        })
    }

    /// Decomposes a request under the given tier.
    ///
    /// The returned graph is validated (acyclic, no dangling
    /// dependencies) and padded with verification tasks up to the
    /// tier's minimum invocation count.
    pub fn decompose(
        &self,
        request: &Request,
        tier: Tier,
        profile: &TierProfile,
    ) -> StrataResult<DependencyGraph> {
        let payload = request.payload.trim();
        if payload.is_empty() {
            return Err(StrataError::Decomposition(
                "Cannot decompose an empty request".to_string(),
            ));
        }
        if self.registry.is_empty() {
            return Err(StrataError::Decomposition(
                "No capabilities registered".to_string(),
            ));
        }

        let mut graph = DependencyGraph::new();
        match tier {
            Tier::Trivial => {
                graph.add(self.direct_task(request)?);
            }
            Tier::Fast => self.decompose_shallow(payload, &mut graph)?,
            Tier::Standard | Tier::Advanced | Tier::Full => {
                self.decompose_deep(payload, &mut graph)?;
            }
        }

        self.pad_to_minimum(&mut graph, profile.min_capability_invocations)?;
        graph.validate()?;

        debug!(
            request_id = %request.id,
            tier = %tier,
            tasks = graph.len(),
            "Decomposition complete"
        );
        Ok(graph)
    }

    /// Maps a whole request onto a single dependency-free task — the
    /// trivial-tier direct execution path, where decomposition proper is
    /// skipped.
    pub fn direct_task(&self, request: &Request) -> StrataResult<Task> {
        let payload = request.payload.trim();
        if payload.is_empty() {
            return Err(StrataError::Decomposition(
                "Cannot decompose an empty request".to_string(),
            ));
        }
        let capability = self.resolve_capability(payload)?;
        Ok(Task::new(payload, capability))
    }

    /// Fast tier: sequential groups only, capped at three tasks with the
    /// remainder folded into the last.
    fn decompose_shallow(&self, payload: &str, graph: &mut DependencyGraph) -> StrataResult<()> {
        let mut groups = self.split_nonempty(&self.sequential_split, payload);
        if groups.len() > FAST_TIER_MAX_TASKS {
            let tail = groups.split_off(FAST_TIER_MAX_TASKS - 1).join("; ");
            groups.push(tail);
        }

        let mut previous: Option<Uuid> = None;
        for group in groups {
            let capability = self.resolve_capability(&group)?;
            let mut task = Task::new(group, capability);
            if let Some(prev) = previous {
                task = task.with_dependencies([prev]);
            }
            previous = Some(graph.add(task));
        }
        Ok(())
    }

    /// Standard and above: sequential groups chained, conjunctions
    /// within a group split into parallel siblings, each resolved to
    /// exactly one capability.
    fn decompose_deep(&self, payload: &str, graph: &mut DependencyGraph) -> StrataResult<()> {
        let groups = self.split_nonempty(&self.sequential_split, payload);
        let mut previous_group: Vec<Uuid> = Vec::new();

        for group in groups {
            let segments = self.split_nonempty(&self.parallel_split, &group);
            let mut current_group = Vec::new();
            for segment in segments {
                let capability = self.resolve_capability(&segment)?;
                let task =
                    Task::new(segment, capability).with_dependencies(previous_group.clone());
                current_group.push(graph.add(task));
            }
            previous_group = current_group;
        }
        Ok(())
    }

    fn split_nonempty(&self, pattern: &Regex, input: &str) -> Vec<String> {
        let parts: Vec<String> = pattern
            .split(input)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if parts.is_empty() {
            vec![input.trim().to_string()]
        } else {
            parts
        }
    }

    /// Resolves a segment to one capability.
    ///
    /// Candidates are capabilities whose keywords appear in the segment.
    /// Among several candidates the highest historical success rate
    /// wins; on a tie, the more specific (longer) keyword match; then
    /// the lexicographically smallest ID for determinism. A segment
    /// matching nothing falls back to the smallest registered ID.
    fn resolve_capability(&self, segment: &str) -> StrataResult<String> {
        let lowered = segment.to_lowercase();
        let mut candidates: Vec<(String, usize)> = Vec::new();

        for descriptor in self.registry.descriptors() {
            let specificity = descriptor
                .keywords
                .iter()
                .filter(|kw| lowered.contains(&kw.to_lowercase()))
                .map(|kw| kw.len())
                .max();
            if let Some(specificity) = specificity {
                candidates.push((descriptor.id.clone(), specificity));
            }
        }

        if candidates.is_empty() {
            let mut ids: Vec<String> = self
                .registry
                .descriptors()
                .iter()
                .map(|d| d.id.clone())
                .collect();
            ids.sort();
            return ids.into_iter().next().ok_or_else(|| {
                StrataError::Decomposition("No capabilities registered".to_string())
            });
        }

        candidates.sort_by(|(a_id, a_spec), (b_id, b_spec)| {
            let a_rate = self.stats.success_rate(a_id).unwrap_or(0.5);
            let b_rate = self.stats.success_rate(b_id).unwrap_or(0.5);
            b_rate
                .partial_cmp(&a_rate)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b_spec.cmp(a_spec))
                .then(a_id.cmp(b_id))
        });

        Ok(candidates.remove(0).0)
    }

    /// Appends verification tasks until the graph meets the tier's
    /// minimum invocation count. Each one depends on the current sinks,
    /// so they execute after the work they check.
    fn pad_to_minimum(&self, graph: &mut DependencyGraph, minimum: u32) -> StrataResult<()> {
        while (graph.len() as u32) < minimum {
            let sinks = graph.sinks();
            let capability = graph
                .tasks()
                .last()
                .map(|t| t.required_capability.clone())
                .ok_or_else(|| {
                    StrataError::Decomposition("Cannot pad an empty graph".to_string())
                })?;
            let task = Task::new(
                "Cross-check the combined results for consistency",
                capability,
            )
            .with_dependencies(sinks);
            graph.add(task);
        }
        Ok(())
    }
}
