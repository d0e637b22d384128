//! Recursion detection over the rule dependency graph (Tarjan SCC).

use super::rules::RuleTable;
use crate::error::{Error, ErrorSink};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

type Graph = BTreeMap<String, BTreeSet<String>>;

/// One error per cycle, reported at the first rule of the lexically smallest path in it.
pub(crate) fn check(table: &RuleTable<'_>, deps: &Graph, sink: &mut ErrorSink) {
    for scc in strongly_connected(deps) {
        let start = scc[0].as_str();
        let self_loop = deps.get(start).is_some_and(|d| d.contains(start));
        if scc.len() == 1 && !self_loop {
            continue;
        }
        let members: BTreeSet<&str> = scc.iter().map(String::as_str).collect();
        let cycle = find_cycle(start, deps, &members);
        let Some(loc) = table.location(start) else {
            continue;
        };
        sink.push(Error::recursion(
            loc,
            format!("rule {start} is recursive: {}", cycle.join(" -> ")),
        ));
        if sink.halted() {
            return;
        }
    }
}

struct Tarjan<'g> {
    graph: &'g Graph,
    index: BTreeMap<&'g str, usize>,
    low: BTreeMap<&'g str, usize>,
    stack: Vec<&'g str>,
    on_stack: BTreeSet<&'g str>,
    next: usize,
    out: Vec<Vec<String>>,
}

impl<'g> Tarjan<'g> {
    fn visit(&mut self, v: &'g str) {
        self.index.insert(v, self.next);
        self.low.insert(v, self.next);
        self.next += 1;
        self.stack.push(v);
        self.on_stack.insert(v);

        let graph = self.graph;
        for w in graph.get(v).into_iter().flatten() {
            let w = w.as_str();
            let candidate = if !self.index.contains_key(w) {
                self.visit(w);
                self.low.get(w).copied()
            } else if self.on_stack.contains(w) {
                self.index.get(w).copied()
            } else {
                None
            };
            if let Some(c) = candidate {
                let low_v = self.low.entry(v).or_insert(c);
                *low_v = (*low_v).min(c);
            }
        }

        if self.low.get(v) == self.index.get(v) {
            let mut component = Vec::new();
            while let Some(w) = self.stack.pop() {
                self.on_stack.remove(w);
                component.push(w.to_string());
                if w == v {
                    break;
                }
            }
            component.sort();
            self.out.push(component);
        }
    }
}

fn strongly_connected(graph: &Graph) -> Vec<Vec<String>> {
    let mut t = Tarjan {
        graph,
        index: BTreeMap::new(),
        low: BTreeMap::new(),
        stack: Vec::new(),
        on_stack: BTreeSet::new(),
        next: 0,
        out: Vec::new(),
    };
    for v in graph.keys() {
        if !t.index.contains_key(v.as_str()) {
            t.visit(v);
        }
    }
    let mut out = t.out;
    out.sort();
    out
}

/// Shortest path `start -> ... -> start` staying inside `members`.
fn find_cycle(start: &str, graph: &Graph, members: &BTreeSet<&str>) -> Vec<String> {
    let mut parent: BTreeMap<&str, &str> = BTreeMap::new();
    let mut seen: BTreeSet<&str> = BTreeSet::new();
    let mut queue = VecDeque::from([start]);

    while let Some(v) = queue.pop_front() {
        for w in graph.get(v).into_iter().flatten() {
            let w = w.as_str();
            if !members.contains(w) {
                continue;
            }
            if w == start {
                let mut back = Vec::new();
                let mut cur = v;
                while cur != start {
                    back.push(cur);
                    cur = parent.get(cur).copied().unwrap_or(start);
                }
                back.reverse();
                let mut path = vec![start.to_string()];
                path.extend(back.into_iter().map(str::to_string));
                path.push(start.to_string());
                return path;
            }
            if seen.insert(w) {
                parent.insert(w, v);
                queue.push_back(w);
            }
        }
    }
    vec![start.to_string(), start.to_string()]
}
