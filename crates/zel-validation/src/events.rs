//! Event dependency checker.
//!
//! Every append that signals an event and waits on others becomes an action node; each waited
//! event contributes an edge from the action that signals it (or a placeholder for an action yet
//! to be appended) to the new action. An edge that would close a cycle is not recorded and is
//! reported as a potential deadlock instead.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt::Write as _;
use std::sync::Arc;

use parking_lot::Mutex;
use zel_api::{ApiId, ApiParams, EventHandle, ZeResult};

use crate::diagnostics::{Diagnostic, DiagnosticSink};

type NodeId = usize;

const MAX_REPORTED_PATH: usize = 15;

#[derive(Debug, Default)]
struct Dag {
    successors: Vec<BTreeSet<NodeId>>,
}

impl Dag {
    fn new_node(&mut self) -> NodeId {
        self.successors.push(BTreeSet::new());
        self.successors.len() - 1
    }

    fn has_successors(&self, node: NodeId) -> bool {
        !self.successors[node].is_empty()
    }

    /// Inserts `from -> to` unless it would create a cycle.
    fn insert_edge(&mut self, from: NodeId, to: NodeId) -> bool {
        if self.path(to, from, usize::MAX).is_some() {
            return false;
        }
        self.successors[from].insert(to);
        true
    }

    /// Shortest path `from ..= to`, cut to `max_len` nodes. The flag is set when it was cut.
    fn path(&self, from: NodeId, to: NodeId, max_len: usize) -> Option<(Vec<NodeId>, bool)> {
        let mut parent: HashMap<NodeId, NodeId> = HashMap::new();
        let mut queue = VecDeque::from([from]);
        let mut found = from == to;
        while let Some(node) = queue.pop_front() {
            if found {
                break;
            }
            for &next in &self.successors[node] {
                if next == from || parent.contains_key(&next) {
                    continue;
                }
                parent.insert(next, node);
                if next == to {
                    found = true;
                    break;
                }
                queue.push_back(next);
            }
        }
        if !found {
            return None;
        }

        let mut path = vec![to];
        let mut node = to;
        while node != from {
            node = parent[&node];
            path.push(node);
        }
        path.reverse();
        let truncated = path.len() > max_len;
        path.truncate(max_len);
        Some((path, truncated))
    }
}

#[derive(Debug)]
struct Action {
    description: String,
    signal_event: Option<u64>,
}

#[derive(Debug, Default)]
struct State {
    dag: Dag,
    /// Live events and the node of the action that signals them, if any.
    events: HashMap<u64, Option<NodeId>>,
    actions: HashMap<NodeId, Action>,
}

impl State {
    fn describe(&self, node: NodeId) -> String {
        self.actions
            .get(&node)
            .map(|action| action.description.clone())
            .unwrap_or_else(|| "PLACEHOLDER".to_string())
    }
}

/// Stateful cross-call check for circular event waits.
pub struct EventChecker {
    state: Mutex<State>,
    sink: Arc<dyn DiagnosticSink>,
}

impl EventChecker {
    pub fn new(sink: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            state: Mutex::new(State::default()),
            sink,
        }
    }

    /// Number of live events being tracked.
    pub fn tracked_events(&self) -> usize {
        self.state.lock().events.len()
    }

    pub fn prologue(&self, params: &ApiParams) {
        let api = params.api();
        match params {
            ApiParams::CommandListAppendBarrier(p) => {
                self.record(api, p.signal_event, &p.wait_events)
            }
            ApiParams::CommandListAppendMemoryCopy(p) => {
                self.record(api, p.signal_event, &p.wait_events)
            }
            ApiParams::CommandListAppendLaunchKernel(p) => {
                self.record(api, p.signal_event, &p.wait_events)
            }
            ApiParams::CommandListAppendSignalEvent(p) => self.record(api, p.event, &[]),
            ApiParams::CommandListAppendWaitOnEvents(p) => self.record(
                api,
                EventHandle::NULL,
                p.events.as_deref().unwrap_or_default(),
            ),
            ApiParams::CommandListAppendEventReset(p) => self.reset(api, p.event),
            ApiParams::EventHostReset(p) => self.reset(api, p.event),
            ApiParams::EventHostSignal(p) => self.host_signal(p.event),
            _ => {}
        }
    }

    pub fn epilogue(&self, params: &ApiParams, result: ZeResult) {
        if !result.is_success() {
            return;
        }
        match params {
            ApiParams::EventCreate(p) => {
                if let Some(event) = p.event.filter(|event| event.0 != 0) {
                    self.state.lock().events.insert(event.0, None);
                }
            }
            ApiParams::EventDestroy(p) => {
                // Actions stay in the graph so paths through them can still be described.
                self.state.lock().events.remove(&p.event.0);
            }
            _ => {}
        }
    }

    fn record(&self, api: ApiId, signal: EventHandle, waits: &[EventHandle]) {
        let mut diagnostics = Vec::new();
        {
            let mut state = self.state.lock();
            Self::record_locked(&mut state, api, signal, waits, &mut diagnostics);
        }
        for diagnostic in diagnostics {
            self.sink.report(diagnostic);
        }
    }

    fn record_locked(
        state: &mut State,
        api: ApiId,
        signal: EventHandle,
        waits: &[EventHandle],
        diagnostics: &mut Vec<Diagnostic>,
    ) {
        let signal = (signal.0 != 0).then_some(signal.0);
        let mut node = None;
        if let Some(signal) = signal {
            let Some(mapped) = state.events.get(&signal).copied() else {
                diagnostics.push(Diagnostic::UnknownEvent { api, event: signal });
                return;
            };
            if let Some(existing) = mapped {
                if let Some(action) = state.actions.get(&existing) {
                    if action.signal_event.is_some() {
                        diagnostics.push(Diagnostic::SignalEventReused {
                            api,
                            event: signal,
                            previous: action.description.clone(),
                        });
                    }
                }
                node = Some(existing);
            }
        }

        let waits: Vec<u64> = waits.iter().map(|w| w.0).filter(|w| *w != 0).collect();
        if let Some(&unknown) = waits.iter().find(|w| !state.events.contains_key(*w)) {
            diagnostics.push(Diagnostic::UnknownEvent {
                api,
                event: unknown,
            });
            return;
        }

        let node = match node {
            Some(node) => node,
            None => {
                let node = state.dag.new_node();
                if let Some(signal) = signal {
                    state.events.insert(signal, Some(node));
                }
                node
            }
        };

        let mut description = format!(
            "{}: (signal {{{:#x}}}, waits {{",
            api.symbol(),
            signal.unwrap_or(0)
        );
        for (i, wait) in waits.iter().enumerate() {
            if i > 0 {
                description.push_str(", ");
            }
            let _ = write!(description, "{wait:#x}");
        }
        description.push_str("})");
        state.actions.insert(
            node,
            Action {
                description,
                signal_event: signal,
            },
        );

        for wait in waits {
            let wait_node = match state.events.get(&wait).copied().flatten() {
                Some(wait_node) => wait_node,
                None => {
                    // Placeholder for the action that will signal this event later.
                    let wait_node = state.dag.new_node();
                    state.events.insert(wait, Some(wait_node));
                    wait_node
                }
            };
            if state.dag.insert_edge(wait_node, node) {
                continue;
            }
            let (path, truncated) = state
                .dag
                .path(node, wait_node, MAX_REPORTED_PATH)
                .unwrap_or_default();
            diagnostics.push(Diagnostic::PotentialDeadlock {
                api,
                from: state.describe(wait_node),
                to: state.describe(node),
                path: path.into_iter().map(|n| state.describe(n)).collect(),
                truncated,
            });
        }
    }

    fn reset(&self, api: ApiId, event: EventHandle) {
        let mut state = self.state.lock();
        match state.events.get(&event.0).copied() {
            None => {
                drop(state);
                self.sink.report(Diagnostic::UnknownEvent {
                    api,
                    event: event.0,
                });
            }
            Some(mapped) => Self::detach(&mut state, event.0, mapped),
        }
    }

    fn host_signal(&self, event: EventHandle) {
        let mut state = self.state.lock();
        let Some(mapped) = state.events.get(&event.0).copied() else {
            drop(state);
            self.sink.report(Diagnostic::UnknownEvent {
                api: ApiId::EventHostSignal,
                event: event.0,
            });
            return;
        };
        let waited_on = mapped.is_some_and(|node| state.dag.has_successors(node));
        Self::detach(&mut state, event.0, mapped);
        drop(state);
        if waited_on {
            self.sink
                .report(Diagnostic::IllegalHostSignal { event: event.0 });
        }
    }

    /// Unties `event` from its action so it can be reused.
    fn detach(state: &mut State, event: u64, mapped: Option<NodeId>) {
        let Some(node) = mapped else {
            return;
        };
        if let Some(action) = state.actions.get_mut(&node) {
            action.signal_event = None;
        }
        state.events.insert(event, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dag_rejects_cycles_and_reports_paths() {
        let mut dag = Dag::default();
        let a = dag.new_node();
        let b = dag.new_node();
        let c = dag.new_node();
        assert!(dag.insert_edge(a, b));
        assert!(dag.insert_edge(b, c));
        assert!(!dag.insert_edge(c, a));
        assert!(!dag.insert_edge(a, a));
        assert_eq!(dag.path(a, c, 15), Some((vec![a, b, c], false)));
        assert_eq!(dag.path(a, c, 2), Some((vec![a, b], true)));
        assert_eq!(dag.path(c, a, 15), None);
    }
}
