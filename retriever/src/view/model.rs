use dashmap::DashMap;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use tracing::{debug, trace};

use super::element::Element;
use super::sort::SortOrder;
use crate::errors::{SearchError, SearchResult};
use crate::results::{Filter, MatchCounts, ResultEvent, SearchResults};
use crate::workspace::ProjectLayout;

const DEFAULT_ORIGIN: &str = "view";

/// Structural changes a view has to apply, in this order: removals, insertions,
/// refreshes, then expansions.
///
/// A `None` parent or refresh target is the invisible root.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewDelta {
    pub inserted: Vec<(Option<Element>, Element)>,
    pub removed: Vec<(Option<Element>, Element)>,
    pub refreshed: Vec<Option<Element>>,
    /// Elements to expand again, ancestors first
    pub expand: Vec<Element>,
    /// The filter was changed by someone else and filter controls should follow
    pub filter_changed: bool,
}

impl ViewDelta {
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty()
            && self.removed.is_empty()
            && self.refreshed.is_empty()
            && !self.filter_changed
    }
}

#[derive(Default)]
struct Ops {
    inserted: Vec<(Option<Element>, Element)>,
    removed: Vec<(Option<Element>, Element)>,
    refreshed: Vec<Option<Element>>,
}

fn count_suffix(count: usize) -> String {
    if count == 1 {
        "(1 match)".to_string()
    } else {
        format!("({} matches)", count)
    }
}

/// Tree projection of the visible part of a result index.
///
/// The tree holds exactly the elements with visible matches plus their ancestors.
/// Changes are applied incrementally: an element is inserted along with the missing
/// part of its ancestor chain, and removed only once it has no children left.
pub struct ViewModel {
    results: Arc<SearchResults>,
    order: SortOrder,
    layout: Option<ProjectLayout>,
    projects: DashMap<PathBuf, PathBuf>,
    children: HashMap<Option<Element>, Vec<Element>>,
    members: HashSet<Element>,
    expanded: HashSet<Element>,
    selection: Option<Element>,
    summary: Option<MatchCounts>,
    origin: String,
    subscribers: Vec<Sender<ViewDelta>>,
}

impl ViewModel {
    pub fn new(results: Arc<SearchResults>, order: SortOrder) -> Self {
        Self {
            results,
            order,
            layout: None,
            projects: DashMap::new(),
            children: HashMap::new(),
            members: HashSet::new(),
            expanded: HashSet::new(),
            selection: None,
            summary: None,
            origin: DEFAULT_ORIGIN.to_string(),
            subscribers: Vec::new(),
        }
    }

    /// Stops folder chains at project roots. Without a layout, a file's directory is
    /// the topmost folder.
    pub fn with_layout(mut self, layout: ProjectLayout) -> Self {
        self.layout = Some(layout);
        self.projects.clear();
        self
    }

    /// Token tagging filters applied through this view
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    pub fn results(&self) -> &Arc<SearchResults> {
        &self.results
    }

    pub fn sort_order(&self) -> SortOrder {
        self.order
    }

    /// Switches layout and rebuilds
    pub fn set_sort_order(&mut self, order: SortOrder) -> ViewDelta {
        self.order = order;
        self.input_changed()
    }

    pub fn subscribe(&mut self) -> Receiver<ViewDelta> {
        let (tx, rx) = channel();
        self.subscribers.push(tx);
        rx
    }

    fn publish(&mut self, delta: &ViewDelta) {
        if delta.is_empty() {
            return;
        }
        self.subscribers.retain(|tx| tx.send(delta.clone()).is_ok());
    }

    fn project_of(&self, dir: &Path) -> PathBuf {
        if let Some(project) = self.projects.get(dir) {
            return project.clone();
        }
        let project = match &self.layout {
            Some(layout) => layout.project_of_dir(dir),
            None => dir.to_path_buf(),
        };
        self.projects.insert(dir.to_path_buf(), project.clone());
        project
    }

    fn element_path(&self, element: &Element) -> PathBuf {
        match element {
            Element::File(file) => self.results.path(*file).unwrap_or_default(),
            Element::Folder(dir) => dir.clone(),
            _ => PathBuf::new(),
        }
    }

    fn compare(&self, a: &Element, b: &Element) -> Ordering {
        fn rank(e: &Element) -> u8 {
            match e {
                Element::Line { .. } => 0,
                Element::File(_) | Element::Folder(_) => 1,
                Element::FilteredSummary => 2,
            }
        }
        match (a, b) {
            (
                Element::Line {
                    id: left, number: x, ..
                },
                Element::Line {
                    id: right,
                    number: y,
                    ..
                },
            ) => x.cmp(y).then_with(|| left.cmp(right)),
            (Element::File(_) | Element::Folder(_), Element::File(_) | Element::Folder(_)) => self
                .order
                .compare_paths(&self.element_path(a), &self.element_path(b)),
            _ => rank(a).cmp(&rank(b)),
        }
    }

    /// Parent of an element under the current layout; `None` for root level elements
    pub fn get_parent(&self, element: &Element) -> Option<Element> {
        match element {
            Element::Line { file, .. } => Some(Element::File(*file)),
            Element::File(file) => {
                if !self.order.is_hierarchical() {
                    return None;
                }
                let path = self.results.path(*file)?;
                path.parent()
                    .filter(|dir| !dir.as_os_str().is_empty())
                    .map(|dir| Element::Folder(dir.to_path_buf()))
            }
            Element::Folder(dir) => {
                let project = self.project_of(dir);
                if *dir == project || !dir.starts_with(&project) {
                    return None;
                }
                dir.parent().map(|parent| Element::Folder(parent.to_path_buf()))
            }
            Element::FilteredSummary => None,
        }
    }

    /// Children in display order; `None` lists the root
    pub fn get_children(&self, parent: Option<&Element>) -> Vec<Element> {
        let mut children = self
            .children
            .get(&parent.cloned())
            .cloned()
            .unwrap_or_default();
        if parent.is_none() && self.summary.is_some() {
            children.push(Element::FilteredSummary);
        }
        children
    }

    pub fn has_children(&self, element: &Element) -> bool {
        self.children
            .get(&Some(element.clone()))
            .is_some_and(|children| !children.is_empty())
    }

    pub fn contains(&self, element: &Element) -> bool {
        match element {
            Element::FilteredSummary => self.summary.is_some(),
            _ => self.members.contains(element),
        }
    }

    pub fn visible_count(&self, element: &Element) -> usize {
        match element {
            Element::FilteredSummary => 0,
            _ => self.results.visible_count(element),
        }
    }

    fn depth(&self, element: &Element) -> usize {
        let mut depth = 0;
        let mut current = self.get_parent(element);
        while let Some(parent) = current {
            depth += 1;
            current = self.get_parent(&parent);
        }
        depth
    }

    fn insert_child(&mut self, parent: Option<Element>, child: Element) -> bool {
        let position = match self.children.get(&parent) {
            Some(siblings) if siblings.contains(&child) => return false,
            Some(siblings) => {
                siblings.partition_point(|e| self.compare(e, &child) == Ordering::Less)
            }
            None => 0,
        };
        self.children
            .entry(parent)
            .or_default()
            .insert(position, child.clone());
        self.members.insert(child);
        true
    }

    fn remove_child(&mut self, parent: &Option<Element>, child: &Element) {
        if let Some(siblings) = self.children.get_mut(parent) {
            siblings.retain(|e| e != child);
            if siblings.is_empty() {
                self.children.remove(parent);
            }
        }
        self.members.remove(child);
    }

    /// Adds `element` and every missing ancestor. Stops at the first ancestor already
    /// in the tree, which is refreshed instead.
    fn insert(&mut self, element: Element, ops: &mut Ops) {
        let mut child = element;
        let mut parent = self.get_parent(&child);
        loop {
            if !self.insert_child(parent.clone(), child.clone()) {
                ops.refreshed.push(parent.or(Some(child)));
                return;
            }
            ops.inserted.push((parent.clone(), child));
            match parent {
                Some(next) => {
                    parent = self.get_parent(&next);
                    child = next;
                }
                None => return,
            }
        }
    }

    /// Removes `element` if it has neither children nor visible matches, then tries its
    /// parent. An element that still has children is only refreshed.
    fn remove(&mut self, element: Element, ops: &mut Ops) {
        if !self.members.contains(&element) {
            return;
        }
        if self.has_children(&element) || self.visible_count(&element) > 0 {
            ops.refreshed.push(Some(element));
            return;
        }
        let parent = self.get_parent(&element);
        self.children.remove(&Some(element.clone()));
        self.remove_child(&parent, &element);
        self.expanded.remove(&element);
        if self.selection.as_ref() == Some(&element) {
            self.selection = None;
        }
        ops.removed.push((parent.clone(), element));
        if let Some(parent) = parent {
            self.remove(parent, ops);
        }
    }

    fn update_summary(&mut self, ops: &mut Ops) {
        let counts = self.results.counts();
        let show = counts.visible != counts.total;
        match (self.summary, show) {
            (None, true) => ops.inserted.push((None, Element::FilteredSummary)),
            (Some(shown), true) if shown != counts => {
                ops.refreshed.push(Some(Element::FilteredSummary))
            }
            (Some(_), false) => ops.removed.push((None, Element::FilteredSummary)),
            _ => {}
        }
        self.summary = show.then_some(counts);
    }

    fn coalesce(&self, ops: Ops) -> ViewDelta {
        let inserted_set: HashSet<&Element> = ops.inserted.iter().map(|(_, e)| e).collect();
        let removed_set: HashSet<&Element> = ops.removed.iter().map(|(_, e)| e).collect();

        // a new or removed parent carries its subtree along
        let mut inserted: Vec<_> = ops
            .inserted
            .iter()
            .filter(|(parent, _)| !parent.as_ref().is_some_and(|p| inserted_set.contains(p)))
            .cloned()
            .collect();
        let mut removed: Vec<_> = ops
            .removed
            .iter()
            .filter(|(parent, _)| !parent.as_ref().is_some_and(|p| removed_set.contains(p)))
            .cloned()
            .collect();

        let removal_parents: HashSet<&Option<Element>> = removed.iter().map(|(p, _)| p).collect();
        let mut mixed: Vec<Option<Element>> = Vec::new();
        for (parent, _) in &inserted {
            if removal_parents.contains(parent) && !mixed.contains(parent) {
                mixed.push(parent.clone());
            }
        }
        inserted.retain(|(parent, _)| !mixed.contains(parent));
        removed.retain(|(parent, _)| !mixed.contains(parent));

        let mut refreshed: Vec<Option<Element>> = Vec::new();
        for target in mixed.into_iter().chain(ops.refreshed) {
            if let Some(element) = &target {
                if inserted_set.contains(element) || removed_set.contains(element) {
                    continue;
                }
            }
            if !refreshed.contains(&target) {
                refreshed.push(target);
            }
        }

        ViewDelta {
            inserted,
            removed,
            refreshed,
            expand: Vec::new(),
            filter_changed: false,
        }
    }

    fn expansion(&self) -> Vec<Element> {
        let mut expand: Vec<(usize, &Element)> = self
            .expanded
            .iter()
            .filter(|e| self.members.contains(*e) && self.has_children(e))
            .map(|e| (self.depth(e), e))
            .collect();
        expand.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| self.compare(a.1, b.1)));
        expand.into_iter().map(|(_, e)| e.clone()).collect()
    }

    fn finish(&mut self, ops: Ops, filter_changed: bool) -> ViewDelta {
        let mut delta = self.coalesce(ops);
        delta.filter_changed = filter_changed;
        if !delta.is_empty() {
            delta.expand = self.expansion();
        }
        trace!(
            "View delta: {} inserted, {} removed, {} refreshed",
            delta.inserted.len(),
            delta.removed.len(),
            delta.refreshed.len()
        );
        self.publish(&delta);
        delta
    }

    /// Rebuilds the whole tree from the index
    pub fn input_changed(&mut self) -> ViewDelta {
        self.children.clear();
        self.members.clear();
        self.summary = None;

        let mut ops = Ops::default();
        for file in self.results.files() {
            for line in self.results.lines(file) {
                let element = Element::from(line.key());
                if self.visible_count(&element) > 0 {
                    self.insert(element, &mut ops);
                }
            }
        }
        let mut scratch = Ops::default();
        self.update_summary(&mut scratch);
        let members = &self.members;
        self.expanded.retain(|e| members.contains(e));
        if self
            .selection
            .as_ref()
            .is_some_and(|s| !self.members.contains(s))
        {
            self.selection = None;
        }
        debug!("View rebuilt with {} elements", self.members.len());

        let delta = ViewDelta {
            refreshed: vec![None],
            expand: self.expansion(),
            ..ViewDelta::default()
        };
        self.publish(&delta);
        delta
    }

    /// Applies changed visible counts of `updated` to the tree
    pub fn on_elements_changed(&mut self, updated: Vec<Element>) -> ViewDelta {
        self.apply(updated, false)
    }

    fn apply(&mut self, updated: Vec<Element>, filter_changed: bool) -> ViewDelta {
        let mut seen = HashSet::new();
        let mut additions = Vec::new();
        let mut removals = Vec::new();
        for element in updated {
            if element == Element::FilteredSummary || !seen.insert(element.clone()) {
                continue;
            }
            if self.visible_count(&element) > 0 {
                additions.push(element);
            } else {
                removals.push(element);
            }
        }

        let mut ops = Ops::default();
        for element in additions {
            self.insert(element, &mut ops);
        }
        for element in removals {
            self.remove(element, &mut ops);
        }
        self.update_summary(&mut ops);
        self.finish(ops, filter_changed)
    }

    /// Applies one change of the result index
    pub fn handle_event(&mut self, event: &ResultEvent) -> ViewDelta {
        match event {
            ResultEvent::SearchStarted => self.input_changed(),
            ResultEvent::SearchFinished => {
                let mut ops = Ops::default();
                self.update_summary(&mut ops);
                self.finish(ops, false)
            }
            ResultEvent::FilterChanged { origin, .. } => {
                let foreign = origin.as_deref() != Some(self.origin.as_str());
                self.apply(event.updated_elements(), foreign)
            }
            _ => self.apply(event.updated_elements(), false),
        }
    }

    /// Applies a filter on behalf of this view
    pub fn apply_filter(&self, filter: Filter) -> bool {
        self.results
            .apply_filter(filter.from_origin(self.origin.clone()))
    }

    pub fn expand(&mut self, element: &Element) -> SearchResult<()> {
        if !self.members.contains(element) {
            return Err(SearchError::UnknownElement(format!("{:?}", element)));
        }
        self.expanded.insert(element.clone());
        Ok(())
    }

    pub fn collapse(&mut self, element: &Element) {
        self.expanded.remove(element);
    }

    pub fn is_expanded(&self, element: &Element) -> bool {
        self.expanded.contains(element)
    }

    pub fn selection(&self) -> Option<&Element> {
        self.selection.as_ref()
    }

    /// Selects an element and expands its ancestors. Returns the ancestors that were
    /// collapsed before, root first.
    pub fn set_selection(&mut self, element: Option<Element>) -> SearchResult<Vec<Element>> {
        let Some(element) = element else {
            self.selection = None;
            return Ok(Vec::new());
        };
        if !self.members.contains(&element) {
            return Err(SearchError::UnknownElement(format!("{:?}", element)));
        }
        let mut opened = Vec::new();
        let mut current = self.get_parent(&element);
        while let Some(parent) = current {
            current = self.get_parent(&parent);
            if self.expanded.insert(parent.clone()) {
                opened.push(parent);
            }
        }
        opened.reverse();
        self.selection = Some(element);
        Ok(opened)
    }

    pub fn summary_label(&self) -> String {
        let counts = self.results.counts();
        format!("{} of {} matches filtered", counts.filtered(), counts.total)
    }

    pub fn label(&self, element: &Element) -> String {
        let count = self.visible_count(element);
        match element {
            Element::Line { id, number, .. } => {
                let text = self
                    .results
                    .line(*id)
                    .map(|line| line.text().trim().to_string())
                    .unwrap_or_default();
                if count > 1 {
                    format!("{}: {} {}", number, text, count_suffix(count))
                } else {
                    format!("{}: {}", number, text)
                }
            }
            Element::File(file) => {
                let path = self.results.path(*file).unwrap_or_default();
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                match path.parent().filter(|_| !self.order.is_hierarchical()) {
                    Some(parent) => {
                        format!("{} - {} {}", name, parent.display(), count_suffix(count))
                    }
                    None => format!("{} {}", name, count_suffix(count)),
                }
            }
            Element::Folder(dir) => {
                let name = match self.get_parent(element) {
                    None => dir.display().to_string(),
                    Some(_) => dir
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                };
                format!("{} {}", name, count_suffix(count))
            }
            Element::FilteredSummary => self.summary_label(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::{LineSpec, MatchSpec};
    use crate::scanner::LocationKind;

    fn line(number: usize, text: &str, kind: LocationKind) -> LineSpec {
        LineSpec {
            number,
            offset: number * 10,
            text: text.to_string(),
            matches: vec![MatchSpec {
                offset: number * 10,
                length: 3,
                column: 0,
                original: "foo".to_string(),
                kind,
            }],
        }
    }

    fn results() -> Arc<SearchResults> {
        let results = Arc::new(SearchResults::new());
        results.set_lines_for_file(
            Path::new("/ws/proj/src/b.c"),
            vec![
                line(1, "foo // x", LocationKind::COMMENT),
                line(2, "foo();", LocationKind::FUNCTION),
            ],
            None,
        );
        results.set_lines_for_file(
            Path::new("/ws/proj/a.c"),
            vec![line(4, "foo;", LocationKind::OTHER)],
            None,
        );
        results
    }

    fn file(results: &SearchResults, path: &str) -> Element {
        Element::File(results.file_id(Path::new(path)).unwrap())
    }

    #[test]
    fn test_flat_tree() {
        let results = results();
        let mut view = ViewModel::new(Arc::clone(&results), SortOrder::Flat);
        view.input_changed();

        let roots = view.get_children(None);
        assert_eq!(roots, vec![file(&results, "/ws/proj/a.c"), file(&results, "/ws/proj/src/b.c")]);
        let lines = view.get_children(Some(&roots[1]));
        assert_eq!(lines.len(), 2);
        assert_eq!(view.get_parent(&lines[0]), Some(roots[1].clone()));
        assert_eq!(view.get_parent(&roots[0]), None);
        assert!(view.label(&roots[1]).starts_with("b.c - "));
        assert!(view.label(&roots[1]).ends_with("(2 matches)"));
    }

    #[test]
    fn test_hierarchical_tree_stops_at_project() {
        let results = results();
        let layout = ProjectLayout::with_projects("/ws", vec![PathBuf::from("/ws/proj")]);
        let mut view =
            ViewModel::new(Arc::clone(&results), SortOrder::Hierarchical).with_layout(layout);
        view.input_changed();

        let project = Element::Folder(PathBuf::from("/ws/proj"));
        assert_eq!(view.get_children(None), vec![project.clone()]);
        assert_eq!(
            view.get_children(Some(&project)),
            vec![
                file(&results, "/ws/proj/a.c"),
                Element::Folder(PathBuf::from("/ws/proj/src"))
            ]
        );
        assert_eq!(view.label(&project), format!("{} (3 matches)", Path::new("/ws/proj").display()));
    }

    #[test]
    fn test_filter_removes_and_reinserts_minimally() -> SearchResult<()> {
        let results = results();
        let mut view = ViewModel::new(Arc::clone(&results), SortOrder::Flat);
        view.input_changed();
        let events = results.subscribe();
        let b = file(&results, "/ws/proj/src/b.c");
        let comment_line = view.get_children(Some(&b))[0].clone();

        view.apply_filter(Filter::new().accepting(LocationKind::all() - LocationKind::COMMENT));
        let delta = view.handle_event(&events.try_recv().unwrap());
        assert_eq!(delta.removed, vec![(Some(b.clone()), comment_line.clone())]);
        assert!(delta.inserted.iter().all(|(parent, _)| parent.is_none()));
        assert!(!delta.filter_changed);
        assert!(view.contains(&Element::FilteredSummary));
        assert_eq!(view.summary_label(), "1 of 3 matches filtered");

        results.apply_filter(Filter::new());
        let delta = view.handle_event(&events.try_recv().unwrap());
        assert!(delta.filter_changed);
        assert!(delta
            .inserted
            .contains(&(Some(b.clone()), comment_line.clone())));
        assert!(!delta.inserted.iter().any(|(_, e)| *e == b));
        assert!(!view.contains(&Element::FilteredSummary));
        assert_eq!(view.get_children(Some(&b)).len(), 2);
        Ok(())
    }

    #[test]
    fn test_removal_cascades_through_empty_ancestors() {
        let results = results();
        let layout = ProjectLayout::with_projects("/ws", vec![PathBuf::from("/ws/proj")]);
        let mut view =
            ViewModel::new(Arc::clone(&results), SortOrder::Hierarchical).with_layout(layout);
        view.input_changed();
        let events = results.subscribe();

        results.set_lines_for_file(Path::new("/ws/proj/src/b.c"), Vec::new(), None);
        let delta = view.handle_event(&events.try_recv().unwrap());
        let src = Element::Folder(PathBuf::from("/ws/proj/src"));
        assert_eq!(
            delta.removed,
            vec![(Some(Element::Folder(PathBuf::from("/ws/proj"))), src.clone())]
        );
        assert!(!view.contains(&src));
        assert!(view.contains(&Element::Folder(PathBuf::from("/ws/proj"))));
    }

    #[test]
    fn test_expansion_survives_changes() -> SearchResult<()> {
        let results = results();
        let layout = ProjectLayout::with_projects("/ws", vec![PathBuf::from("/ws/proj")]);
        let mut view =
            ViewModel::new(Arc::clone(&results), SortOrder::Hierarchical).with_layout(layout);
        view.input_changed();
        let events = results.subscribe();

        let b = file(&results, "/ws/proj/src/b.c");
        let target = view.get_children(Some(&b))[1].clone();
        let opened = view.set_selection(Some(target))?;
        assert_eq!(
            opened,
            vec![
                Element::Folder(PathBuf::from("/ws/proj")),
                Element::Folder(PathBuf::from("/ws/proj/src")),
                b.clone()
            ]
        );

        view.apply_filter(Filter::new().accepting(LocationKind::all() - LocationKind::COMMENT));
        let delta = view.handle_event(&events.try_recv().unwrap());
        assert_eq!(delta.expand, opened);
        assert!(view.is_expanded(&b));
        assert!(view.expand(&Element::Folder(PathBuf::from("/nowhere"))).is_err());
        Ok(())
    }
}
