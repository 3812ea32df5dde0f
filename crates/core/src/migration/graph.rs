//! The revision graph: heads, bases, ancestry, symbolic targets and
//! upgrade/downgrade plans.

use std::collections::{BTreeSet, HashMap, HashSet};

use super::error::{MigrationError, Result};
use super::script::Revision;

/// Direction of a migration plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Upgrade,
    Downgrade,
}

/// A plan: the revisions to run, in order, and the heads left afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan<'a> {
    pub direction: Direction,
    pub steps: Vec<&'a Revision>,
    pub heads: Vec<String>,
}

/// The closed set of revision scripts of one database.
#[derive(Debug, Clone, Default)]
pub struct RevisionGraph {
    /// Topologically sorted, bases first.
    revisions: Vec<Revision>,
    index: HashMap<String, usize>,
}

impl RevisionGraph {
    /// Validates the scripts and orders them topologically.
    ///
    /// Among revisions that are ready at the same time, the input order
    /// (usually file name order) is kept.
    pub fn new(revisions: Vec<Revision>) -> Result<Self> {
        let mut ids = HashSet::new();
        let mut labels = HashSet::new();
        for revision in &revisions {
            if !ids.insert(revision.id.as_str()) {
                return Err(MigrationError::DuplicateRevision(revision.id.clone()));
            }
            for label in &revision.branch_labels {
                if !labels.insert(label.as_str()) {
                    return Err(MigrationError::DuplicateLabel(label.clone()));
                }
            }
        }

        for revision in &revisions {
            for parent in revision.down_revisions.iter().chain(&revision.depends_on) {
                if !ids.contains(parent.as_str()) {
                    return Err(MigrationError::DanglingReference {
                        revision: revision.id.clone(),
                        missing: parent.clone(),
                    });
                }
            }
        }

        let mut pending = revisions;
        let mut sorted: Vec<Revision> = Vec::with_capacity(pending.len());
        let mut done: HashSet<String> = HashSet::new();

        while !pending.is_empty() {
            let ready = pending.iter().position(|r| {
                r.down_revisions
                    .iter()
                    .chain(&r.depends_on)
                    .all(|parent| done.contains(parent))
            });
            let Some(position) = ready else {
                return Err(MigrationError::Cycle(pending[0].id.clone()));
            };
            let revision = pending.remove(position);
            done.insert(revision.id.clone());
            sorted.push(revision);
        }

        let index = sorted
            .iter()
            .enumerate()
            .map(|(i, r)| (r.id.clone(), i))
            .collect();

        Ok(Self {
            revisions: sorted,
            index,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.revisions.is_empty()
    }

    /// All revisions, bases first.
    pub fn revisions(&self) -> &[Revision] {
        &self.revisions
    }

    pub fn get(&self, id: &str) -> Option<&Revision> {
        self.index.get(id).map(|&i| &self.revisions[i])
    }

    fn position(&self, id: &str) -> usize {
        self.index.get(id).copied().unwrap_or(usize::MAX)
    }

    /// Revisions nothing names as a down revision.
    ///
    /// With `resolve_dependencies`, revisions named only in `depends_on`
    /// are not heads either.
    pub fn heads(&self, resolve_dependencies: bool) -> Vec<&Revision> {
        let mut parents: HashSet<&str> = HashSet::new();
        for revision in &self.revisions {
            parents.extend(revision.down_revisions.iter().map(String::as_str));
            if resolve_dependencies {
                parents.extend(revision.depends_on.iter().map(String::as_str));
            }
        }
        self.revisions
            .iter()
            .filter(|r| !parents.contains(r.id.as_str()))
            .collect()
    }

    pub fn head_ids(&self) -> Vec<String> {
        self.heads(false).iter().map(|r| r.id.clone()).collect()
    }

    pub fn bases(&self) -> Vec<&Revision> {
        self.revisions.iter().filter(|r| r.is_base()).collect()
    }

    pub fn children(&self, id: &str) -> Vec<&Revision> {
        self.revisions
            .iter()
            .filter(|r| r.down_revisions.iter().any(|d| d == id))
            .collect()
    }

    /// Revisions that are the down revision of more than one revision.
    pub fn branch_points(&self) -> Vec<&Revision> {
        self.revisions
            .iter()
            .filter(|r| self.children(&r.id).len() > 1)
            .collect()
    }

    /// `ids` and everything they need, dependencies included.
    pub fn closure<S: AsRef<str>>(&self, ids: &[S]) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<&str> = ids.iter().map(AsRef::as_ref).collect();

        while let Some(id) = stack.pop() {
            let Some(revision) = self.get(id) else {
                continue;
            };
            if seen.insert(revision.id.clone()) {
                stack.extend(revision.down_revisions.iter().map(String::as_str));
                stack.extend(revision.depends_on.iter().map(String::as_str));
            }
        }
        seen
    }

    /// Revisions that descend from `id` (inclusive).
    pub fn descendants(&self, id: &str) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut stack = vec![id.to_string()];

        while let Some(id) = stack.pop() {
            if self.get(&id).is_none() || !seen.insert(id.clone()) {
                continue;
            }
            stack.extend(self.children(&id).iter().map(|r| r.id.clone()));
        }
        seen
    }

    /// The members of `set` that no other member names as a down revision.
    pub fn tips(&self, set: &BTreeSet<String>) -> Vec<String> {
        let parents: HashSet<&str> = set
            .iter()
            .filter_map(|id| self.get(id))
            .flat_map(|r| r.down_revisions.iter().map(String::as_str))
            .collect();
        let mut tips: Vec<String> = set
            .iter()
            .filter(|id| !parents.contains(id.as_str()))
            .cloned()
            .collect();
        tips.sort_by_key(|id| self.position(id));
        tips
    }

    fn sorted<'a>(&'a self, ids: &BTreeSet<String>) -> Vec<&'a Revision> {
        self.revisions.iter().filter(|r| ids.contains(&r.id)).collect()
    }

    /// Looks up a revision by full id, unique id prefix or branch label.
    pub fn lookup(&self, symbol: &str) -> Result<&Revision> {
        if let Some(revision) = self.get(symbol) {
            return Ok(revision);
        }
        if let Some(revision) = self
            .revisions
            .iter()
            .find(|r| r.branch_labels.iter().any(|l| l == symbol))
        {
            return Ok(revision);
        }

        let candidates: Vec<&Revision> = self
            .revisions
            .iter()
            .filter(|r| r.id.starts_with(symbol))
            .collect();
        match candidates.as_slice() {
            [revision] => Ok(revision),
            [] => Err(MigrationError::UnknownRevision(symbol.to_string())),
            many => Err(MigrationError::AmbiguousPrefix {
                prefix: symbol.to_string(),
                candidates: many.iter().map(|r| r.id.as_str()).collect::<Vec<_>>().join(", "),
            }),
        }
    }

    /// Resolves a symbolic target to the revision ids it denotes.
    ///
    /// Understands `base`, `head`, `heads`, `<label>@head`, revision ids and
    /// unique prefixes, branch labels and `+N` / `-N` relative to `current`.
    pub fn resolve<S: AsRef<str>>(&self, symbol: &str, current: &[S]) -> Result<Vec<String>> {
        match symbol {
            "base" => Ok(Vec::new()),
            "heads" => Ok(self.head_ids()),
            "head" => match self.head_ids().as_slice() {
                [] => Ok(Vec::new()),
                [head] => Ok(vec![head.clone()]),
                _ => Err(MigrationError::MultipleHeads("head".to_string())),
            },
            _ => {
                if let Some(label) = symbol.strip_suffix("@head") {
                    let root = self.lookup(label)?;
                    let descendants = self.descendants(&root.id);
                    return match self.tips(&descendants).as_slice() {
                        [head] => Ok(vec![head.clone()]),
                        _ => Err(MigrationError::MultipleHeads(symbol.to_string())),
                    };
                }
                if let Some(steps) = relative(symbol, '+') {
                    return self.step_up(symbol, current, steps);
                }
                if let Some(steps) = relative(symbol, '-') {
                    return self.step_down(symbol, current, steps);
                }
                Ok(vec![self.lookup(symbol)?.id.clone()])
            }
        }
    }

    fn single_current<'a, S: AsRef<str>>(
        &self,
        symbol: &str,
        current: &'a [S],
    ) -> Result<Option<&'a str>> {
        match current {
            [] => Ok(None),
            [one] => Ok(Some(one.as_ref())),
            _ => Err(MigrationError::MultipleHeads(symbol.to_string())),
        }
    }

    fn step_up<S: AsRef<str>>(
        &self,
        symbol: &str,
        current: &[S],
        steps: u32,
    ) -> Result<Vec<String>> {
        let mut position = self.single_current(symbol, current)?.map(String::from);

        for _ in 0..steps {
            let next = match &position {
                None => self.bases(),
                Some(id) => self.children(id),
            };
            position = match next.as_slice() {
                [one] => Some(one.id.clone()),
                [] => return Err(MigrationError::RelativeOutOfRange(symbol.to_string(), steps)),
                _ => return Err(MigrationError::MultipleHeads(symbol.to_string())),
            };
        }

        Ok(position.into_iter().collect())
    }

    fn step_down<S: AsRef<str>>(
        &self,
        symbol: &str,
        current: &[S],
        steps: u32,
    ) -> Result<Vec<String>> {
        let mut position = self.single_current(symbol, current)?.map(String::from);

        for _ in 0..steps {
            let Some(id) = position else {
                return Err(MigrationError::RelativeOutOfRange(symbol.to_string(), steps));
            };
            let revision = self
                .get(&id)
                .ok_or_else(|| MigrationError::UnknownRevision(id.clone()))?;
            position = match revision.down_revisions.as_slice() {
                [] => None,
                [one] => Some(one.clone()),
                _ => return Err(MigrationError::MultipleHeads(symbol.to_string())),
            };
        }

        Ok(position.into_iter().collect())
    }

    /// Revisions to apply to move from `current` up to `target`.
    pub fn upgrade_plan<S: AsRef<str>, T: AsRef<str>>(
        &self,
        current: &[S],
        target: &[T],
    ) -> Plan<'_> {
        let applied = self.closure(current);
        let wanted = self.closure(target);
        let todo: BTreeSet<String> = wanted.difference(&applied).cloned().collect();
        let after: BTreeSet<String> = applied.union(&wanted).cloned().collect();

        Plan {
            direction: Direction::Upgrade,
            steps: self.sorted(&todo),
            heads: self.tips(&after),
        }
    }

    /// Revisions to revert to move from `current` down to `target`.
    pub fn downgrade_plan<S: AsRef<str>, T: AsRef<str>>(
        &self,
        current: &[S],
        target: &[T],
    ) -> Plan<'_> {
        let applied = self.closure(current);
        let kept = self.closure(target);
        let todo: BTreeSet<String> = applied.difference(&kept).cloned().collect();
        let after: BTreeSet<String> = applied.intersection(&kept).cloned().collect();

        let mut steps = self.sorted(&todo);
        steps.reverse();
        Plan {
            direction: Direction::Downgrade,
            steps,
            heads: self.tips(&after),
        }
    }

    /// Revisions of a `[start]:[end]` range, newest first. Both ends are
    /// inclusive; an empty start means base and an empty end means heads.
    pub fn history<S: AsRef<str>>(
        &self,
        range: Option<&str>,
        current: &[S],
    ) -> Result<Vec<&Revision>> {
        let (start, end) = match range {
            None => ("", ""),
            Some(range) => range
                .split_once(':')
                .ok_or_else(|| MigrationError::InvalidRange(range.to_string()))?,
        };

        let end_ids = match end {
            "" => self.head_ids(),
            "current" => current.iter().map(|c| c.as_ref().to_string()).collect(),
            symbol => self.resolve(symbol, current)?,
        };
        let mut included = self.closure(&end_ids);

        let start_ids = match start {
            "" | "base" => Vec::new(),
            "current" => current.iter().map(|c| c.as_ref().to_string()).collect(),
            symbol => self.resolve(symbol, current)?,
        };
        let mut excluded = self.closure(&start_ids);
        for id in &start_ids {
            excluded.remove(id);
        }
        included.retain(|id| !excluded.contains(id));

        let mut revisions = self.sorted(&included);
        revisions.reverse();
        Ok(revisions)
    }
}

fn relative(symbol: &str, sign: char) -> Option<u32> {
    symbol.strip_prefix(sign).and_then(|n| n.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rev(id: &str, parents: &[&str]) -> Revision {
        Revision::new(id, parents.iter().map(|p| p.to_string()).collect()).message(id)
    }

    fn ids(revisions: &[&Revision]) -> Vec<String> {
        revisions.iter().map(|r| r.id.clone()).collect()
    }

    /// a1 <- b2 <- c3 (linear)
    fn linear() -> RevisionGraph {
        RevisionGraph::new(vec![rev("c3", &["b2"]), rev("a1", &[]), rev("b2", &["a1"])]).unwrap()
    }

    /// a1 <- b2 <- c3, a1 <- d4 (branched at a1)
    fn branched() -> RevisionGraph {
        RevisionGraph::new(vec![
            rev("a1", &[]),
            rev("b2", &["a1"]),
            rev("c3", &["b2"]),
            rev("d4", &["a1"]).branch_label("feature"),
        ])
        .unwrap()
    }

    #[test]
    fn test_revisions_are_sorted_topologically() {
        assert_eq!(ids(&linear().revisions().iter().collect::<Vec<_>>()), vec!["a1", "b2", "c3"]);
    }

    #[test]
    fn test_heads_bases_and_branch_points() {
        let graph = branched();
        assert_eq!(ids(&graph.heads(false)), vec!["c3", "d4"]);
        assert_eq!(ids(&graph.bases()), vec!["a1"]);
        assert_eq!(ids(&graph.branch_points()), vec!["a1"]);
    }

    #[test]
    fn test_heads_can_resolve_dependencies() {
        let graph = RevisionGraph::new(vec![
            rev("a1", &[]),
            rev("x1", &[]),
            rev("b2", &["a1"]).depends_on("x1"),
        ])
        .unwrap();

        assert_eq!(ids(&graph.heads(false)), vec!["x1", "b2"]);
        assert_eq!(ids(&graph.heads(true)), vec!["b2"]);
    }

    #[test]
    fn test_rejects_duplicates_dangling_and_cycles() {
        assert_eq!(
            RevisionGraph::new(vec![rev("a1", &[]), rev("a1", &[])]).unwrap_err(),
            MigrationError::DuplicateRevision("a1".to_string())
        );
        assert!(matches!(
            RevisionGraph::new(vec![rev("b2", &["zz"])]).unwrap_err(),
            MigrationError::DanglingReference { missing, .. } if missing == "zz"
        ));
        assert!(matches!(
            RevisionGraph::new(vec![rev("a1", &["b2"]), rev("b2", &["a1"])]).unwrap_err(),
            MigrationError::Cycle(_)
        ));
    }

    #[test]
    fn test_resolve_symbols() {
        let graph = linear();
        let none: [&str; 0] = [];

        assert_eq!(graph.resolve("head", &none).unwrap(), vec!["c3"]);
        assert_eq!(graph.resolve("base", &none).unwrap(), Vec::<String>::new());
        assert_eq!(graph.resolve("b", &none).unwrap(), vec!["b2"]);
        assert_eq!(graph.resolve("+2", &none).unwrap(), vec!["b2"]);
        assert_eq!(graph.resolve("-1", &["c3"]).unwrap(), vec!["b2"]);
        assert_eq!(graph.resolve("-3", &["c3"]).unwrap(), Vec::<String>::new());
        assert_eq!(
            graph.resolve("+1", &["c3"]).unwrap_err(),
            MigrationError::RelativeOutOfRange("+1".to_string(), 1)
        );
        assert_eq!(
            graph.resolve("zz", &none).unwrap_err(),
            MigrationError::UnknownRevision("zz".to_string())
        );
    }

    #[test]
    fn test_resolve_with_several_heads() {
        let graph = branched();
        let none: [&str; 0] = [];

        assert_eq!(
            graph.resolve("head", &none).unwrap_err(),
            MigrationError::MultipleHeads("head".to_string())
        );
        assert_eq!(graph.resolve("heads", &none).unwrap(), vec!["c3", "d4"]);
        assert_eq!(graph.resolve("feature@head", &none).unwrap(), vec!["d4"]);
        assert_eq!(graph.resolve("feature", &none).unwrap(), vec!["d4"]);
    }

    #[test]
    fn test_ambiguous_prefix() {
        let graph = RevisionGraph::new(vec![rev("ab1", &[]), rev("ab2", &["ab1"])]).unwrap();
        assert!(matches!(
            graph.lookup("ab").unwrap_err(),
            MigrationError::AmbiguousPrefix { .. }
        ));
    }

    #[test]
    fn test_upgrade_plan_from_scratch() {
        let graph = linear();
        let none: [&str; 0] = [];
        let plan = graph.upgrade_plan(&none, &["c3"]);

        assert_eq!(ids(&plan.steps), vec!["a1", "b2", "c3"]);
        assert_eq!(plan.heads, vec!["c3"]);
    }

    #[test]
    fn test_upgrade_plan_across_branches() {
        let graph = branched();
        let plan = graph.upgrade_plan(&["b2"], &["c3", "d4"]);

        assert_eq!(ids(&plan.steps), vec!["c3", "d4"]);
        assert_eq!(plan.heads, vec!["c3", "d4"]);
    }

    #[test]
    fn test_downgrade_plan_runs_newest_first() {
        let graph = linear();
        let none: [&str; 0] = [];

        let plan = graph.downgrade_plan(&["c3"], &["a1"]);
        assert_eq!(ids(&plan.steps), vec!["c3", "b2"]);
        assert_eq!(plan.heads, vec!["a1"]);

        let plan = graph.downgrade_plan(&["c3"], &none);
        assert_eq!(plan.steps.len(), 3);
        assert!(plan.heads.is_empty());
    }

    #[test]
    fn test_downgrade_one_branch_keeps_the_other() {
        let graph = branched();
        let plan = graph.downgrade_plan(&["c3", "d4"], &["c3"]);

        assert_eq!(ids(&plan.steps), vec!["d4"]);
        assert_eq!(plan.heads, vec!["c3"]);
    }

    #[test]
    fn test_history_ranges() {
        let graph = linear();
        let none: [&str; 0] = [];

        assert_eq!(ids(&graph.history(None, &none).unwrap()), vec!["c3", "b2", "a1"]);
        assert_eq!(ids(&graph.history(Some("b2:"), &none).unwrap()), vec!["c3", "b2"]);
        assert_eq!(ids(&graph.history(Some(":b2"), &none).unwrap()), vec!["b2", "a1"]);
        assert_eq!(ids(&graph.history(Some("current:"), &["b2"]).unwrap()), vec!["c3", "b2"]);
        assert_eq!(
            graph.history(Some("b2"), &none).unwrap_err(),
            MigrationError::InvalidRange("b2".to_string())
        );
    }
}
