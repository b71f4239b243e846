//! In-memory accessibility backend.
//!
//! Builds a scripted tree from [`NodeSpec`]s and answers every engine, directory and input
//! call from it, so resolution, interaction and menu logic can run without a desktop.
//! Menus are modelled with lazy children: they stay hidden until the node receives
//! `AXPress` and disappear again on `AXCancel` or when an item inside them is pressed.

use crate::element::{
    AttributeValue, Frame, NativeElementImpl, NativeHandle, Point, ATTR_FRAME, ATTR_ROLE,
    ATTR_TITLE,
};
use crate::errors::{AutomationError, NativeError};
use crate::input::{InputBackend, InputEvent, KeyEvent, MouseEvent, MouseEventKind, ScrollEvent};
use crate::platforms::{AccessibilityEngine, ApplicationDirectory, PlatformBackend, ProcessHandle};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

pub const ACTION_PRESS: &str = "AXPress";
pub const ACTION_CANCEL: &str = "AXCancel";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// Declarative description of a node and its subtree.
#[derive(Debug, Clone, Default)]
pub struct NodeSpec {
    role: String,
    attributes: BTreeMap<String, AttributeValue>,
    actions: Vec<String>,
    settable: HashSet<String>,
    children: Vec<NodeSpec>,
    lazy: bool,
    pid: Option<i32>,
    bundle_id: Option<String>,
}

impl NodeSpec {
    pub fn new(role: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            ..Default::default()
        }
    }

    pub fn application(name: &str, pid: i32) -> Self {
        let mut spec = Self::new("AXApplication").title(name);
        spec.pid = Some(pid);
        spec
    }

    pub fn bundle_id(mut self, bundle_id: &str) -> Self {
        self.bundle_id = Some(bundle_id.to_string());
        self
    }

    pub fn attr(mut self, name: &str, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    pub fn title(self, title: &str) -> Self {
        self.attr(ATTR_TITLE, title)
    }

    pub fn frame(mut self, x: f64, y: f64, width: f64, height: f64) -> Self {
        self.attributes.insert(
            ATTR_FRAME.to_string(),
            AttributeValue::Frame(Frame::new(x, y, width, height)),
        );
        self
    }

    pub fn action(mut self, action: &str) -> Self {
        self.actions.push(action.to_string());
        self
    }

    pub fn actions(mut self, actions: &[&str]) -> Self {
        self.actions.extend(actions.iter().map(|a| a.to_string()));
        self
    }

    /// Allow `set_attribute` for `name`.
    pub fn settable(mut self, name: &str) -> Self {
        self.settable.insert(name.to_string());
        self
    }

    pub fn child(mut self, child: NodeSpec) -> Self {
        self.children.push(child);
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = NodeSpec>) -> Self {
        self.children.extend(children);
        self
    }

    /// Children exist but are only exposed after `AXPress`, like a closed menu.
    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }
}

#[derive(Debug)]
struct NodeState {
    role: String,
    attributes: BTreeMap<String, AttributeValue>,
    actions: Vec<String>,
    settable: HashSet<String>,
    parent: Option<usize>,
    children: Vec<usize>,
    lazy: bool,
    open: bool,
    removed: bool,
    pid: i32,
}

#[derive(Debug, Default)]
struct TreeState {
    nodes: Vec<NodeState>,
    processes: Vec<(usize, ProcessHandle)>,
    action_log: Vec<(NodeId, String)>,
    set_log: Vec<(NodeId, String, AttributeValue)>,
    failing_actions: HashMap<(usize, String), NativeError>,
    failing_once: HashMap<(usize, String), NativeError>,
    failing_after: HashMap<(usize, String), (u32, NativeError)>,
    failing_sets: HashMap<(usize, String), NativeError>,
    transient_reads: HashMap<usize, u32>,
    read_delays: HashMap<usize, Duration>,
}

impl TreeState {
    fn insert(&mut self, spec: NodeSpec, parent: Option<usize>, inherited_pid: i32) -> usize {
        let id = self.nodes.len();
        let pid = spec.pid.unwrap_or(inherited_pid);
        if spec.pid.is_some() {
            let name = spec.attributes.get(ATTR_TITLE).and_then(|v| v.as_str().map(String::from));
            self.processes.push((
                id,
                ProcessHandle {
                    pid,
                    bundle_id: spec.bundle_id.clone(),
                    name,
                },
            ));
        }
        self.nodes.push(NodeState {
            role: spec.role,
            attributes: spec.attributes,
            actions: spec.actions,
            settable: spec.settable,
            parent,
            children: Vec::new(),
            lazy: spec.lazy,
            open: false,
            removed: false,
            pid,
        });
        for child in spec.children {
            let child_id = self.insert(child, Some(id), pid);
            self.nodes[id].children.push(child_id);
        }
        id
    }

    fn node(&self, id: usize) -> Result<&NodeState, NativeError> {
        match self.nodes.get(id) {
            Some(node) if !node.removed => Ok(node),
            _ => Err(NativeError::InvalidUIElement),
        }
    }

    fn take_transient(&mut self, id: usize) -> Result<(), NativeError> {
        if let Some(remaining) = self.transient_reads.get_mut(&id) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(NativeError::CannotComplete);
            }
        }
        Ok(())
    }

    fn visible_children(&self, id: usize) -> Result<Vec<usize>, NativeError> {
        let node = self.node(id)?;
        if node.lazy && !node.open {
            return Ok(Vec::new());
        }
        Ok(node
            .children
            .iter()
            .copied()
            .filter(|c| !self.nodes[*c].removed)
            .collect())
    }

    fn ancestors(&self, id: usize) -> Vec<usize> {
        let mut out = Vec::new();
        let mut current = self.nodes.get(id).and_then(|n| n.parent);
        while let Some(p) = current {
            out.push(p);
            current = self.nodes[p].parent;
        }
        out
    }

    fn close_subtree(&mut self, id: usize) {
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            self.nodes[n].open = false;
            stack.extend(self.nodes[n].children.iter().copied());
        }
    }

    fn close_all(&mut self) {
        for node in &mut self.nodes {
            node.open = false;
        }
    }

    fn perform(&mut self, id: usize, action: &str) -> Result<(), NativeError> {
        let node = self.node(id)?;
        if !node.actions.iter().any(|a| a == action) {
            return Err(NativeError::ActionUnsupported);
        }
        let lazy = node.lazy;
        let key = (id, action.to_string());
        if let Some(err) = self.failing_actions.get(&key) {
            return Err(*err);
        }
        if let Some(err) = self.failing_once.remove(&key) {
            return Err(err);
        }
        if let Some((left, err)) = self.failing_after.get_mut(&key) {
            if *left == 0 {
                return Err(*err);
            }
            *left -= 1;
        }
        self.action_log.push((NodeId(id), action.to_string()));

        match action {
            ACTION_PRESS if lazy => self.nodes[id].open = true,
            ACTION_PRESS => {
                // Activating an item inside an open menu dismisses every menu.
                let inside_menu = self
                    .ancestors(id)
                    .iter()
                    .any(|a| self.nodes[*a].lazy && self.nodes[*a].open);
                if inside_menu {
                    self.close_all();
                }
            }
            ACTION_CANCEL => {
                for ancestor in self.ancestors(id) {
                    if self.nodes[ancestor].lazy {
                        self.nodes[ancestor].open = false;
                    }
                }
                self.close_subtree(id);
            }
            _ => {}
        }
        Ok(())
    }
}

fn lock(state: &Mutex<TreeState>) -> MutexGuard<'_, TreeState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A shared, mutable scripted accessibility tree.
#[derive(Clone)]
pub struct MemoryTree {
    state: Arc<Mutex<TreeState>>,
    root: usize,
}

impl fmt::Debug for MemoryTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryTree")
            .field("nodes", &lock(&self.state).nodes.len())
            .finish()
    }
}

impl MemoryTree {
    /// `root` becomes the system-wide element; application specs go beneath it.
    pub fn new(root: NodeSpec) -> Self {
        let mut state = TreeState::default();
        let root = state.insert(root, None, 0);
        Self {
            state: Arc::new(Mutex::new(state)),
            root,
        }
    }

    /// A system-wide root holding the given applications.
    pub fn with_applications(apps: impl IntoIterator<Item = NodeSpec>) -> Self {
        Self::new(NodeSpec::new("AXSystemWide").children(apps))
    }

    pub fn root(&self) -> NodeId {
        NodeId(self.root)
    }

    pub fn handle(&self, id: NodeId) -> NativeHandle {
        NativeHandle::new(MemoryElement {
            state: self.state.clone(),
            id: id.0,
        })
    }

    /// First node in creation order with `role` and, if given, `title`.
    pub fn find(&self, role: &str, title: Option<&str>) -> Option<NodeId> {
        let state = lock(&self.state);
        state
            .nodes
            .iter()
            .position(|n| {
                !n.removed
                    && n.role == role
                    && title.map_or(true, |t| {
                        n.attributes.get(ATTR_TITLE).and_then(|v| v.as_str()) == Some(t)
                    })
            })
            .map(NodeId)
    }

    pub fn processes(&self) -> Vec<ProcessHandle> {
        lock(&self.state)
            .processes
            .iter()
            .map(|(_, p)| p.clone())
            .collect()
    }

    fn application_node(&self, pid: i32) -> Option<usize> {
        lock(&self.state)
            .processes
            .iter()
            .find(|(_, p)| p.pid == pid)
            .map(|(id, _)| *id)
    }

    /// Every action invoked so far, in order.
    pub fn action_log(&self) -> Vec<(NodeId, String)> {
        lock(&self.state).action_log.clone()
    }

    pub fn actions_on(&self, id: NodeId) -> Vec<String> {
        lock(&self.state)
            .action_log
            .iter()
            .filter(|(n, _)| *n == id)
            .map(|(_, a)| a.clone())
            .collect()
    }

    pub fn set_log(&self) -> Vec<(NodeId, String, AttributeValue)> {
        lock(&self.state).set_log.clone()
    }

    pub fn clear_logs(&self) {
        let mut state = lock(&self.state);
        state.action_log.clear();
        state.set_log.clear();
    }

    pub fn fail_action(&self, id: NodeId, action: &str, error: NativeError) {
        lock(&self.state)
            .failing_actions
            .insert((id.0, action.to_string()), error);
    }

    /// Only the next invocation of `action` on `id` fails.
    pub fn fail_next_action(&self, id: NodeId, action: &str, error: NativeError) {
        lock(&self.state)
            .failing_once
            .insert((id.0, action.to_string()), error);
    }

    /// `action` on `id` succeeds `successes` times, then keeps failing.
    pub fn fail_action_after(&self, id: NodeId, action: &str, successes: u32, error: NativeError) {
        lock(&self.state)
            .failing_after
            .insert((id.0, action.to_string()), (successes, error));
    }

    pub fn fail_set(&self, id: NodeId, attribute: &str, error: NativeError) {
        lock(&self.state)
            .failing_sets
            .insert((id.0, attribute.to_string()), error);
    }

    /// The next `count` attribute or children reads on `id` fail with `CannotComplete`.
    pub fn inject_transient(&self, id: NodeId, count: u32) {
        lock(&self.state).transient_reads.insert(id.0, count);
    }

    /// Every attribute read on `id` blocks for `delay`, like a busy application.
    pub fn slow_reads(&self, id: NodeId, delay: Duration) {
        lock(&self.state).read_delays.insert(id.0, delay);
    }

    /// The node and its subtree vanish; existing handles start failing.
    pub fn remove(&self, id: NodeId) {
        let mut state = lock(&self.state);
        let mut stack = vec![id.0];
        while let Some(n) = stack.pop() {
            state.nodes[n].removed = true;
            stack.extend(state.nodes[n].children.clone());
        }
    }

    pub fn add_child(&self, parent: NodeId, spec: NodeSpec) -> NodeId {
        let mut state = lock(&self.state);
        let pid = state.nodes[parent.0].pid;
        let id = state.insert(spec, Some(parent.0), pid);
        state.nodes[parent.0].children.push(id);
        NodeId(id)
    }

    pub fn set_attribute(&self, id: NodeId, name: &str, value: impl Into<AttributeValue>) {
        lock(&self.state).nodes[id.0]
            .attributes
            .insert(name.to_string(), value.into());
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<AttributeValue> {
        lock(&self.state).nodes[id.0].attributes.get(name).cloned()
    }

    pub fn is_open(&self, id: NodeId) -> bool {
        lock(&self.state).nodes[id.0].open
    }

    pub fn open_menus(&self) -> Vec<NodeId> {
        lock(&self.state)
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.lazy && n.open)
            .map(|(i, _)| NodeId(i))
            .collect()
    }

    /// Deepest visible node whose frame contains `point`; later siblings are on top.
    fn hit_test(&self, from: usize, point: Point) -> Option<usize> {
        let state = lock(&self.state);
        fn frame_of(state: &TreeState, id: usize) -> Option<Frame> {
            match state.nodes[id].attributes.get(ATTR_FRAME) {
                Some(AttributeValue::Frame(f)) => Some(*f),
                _ => None,
            }
        }
        fn descend(state: &TreeState, id: usize, point: Point) -> Option<usize> {
            let children = state.visible_children(id).ok()?;
            for child in children.into_iter().rev() {
                if let Some(hit) = descend(state, child, point) {
                    return Some(hit);
                }
            }
            frame_of(state, id).filter(|f| f.contains(point)).map(|_| id)
        }
        descend(&state, from, point)
    }
}

#[derive(Clone)]
pub struct MemoryElement {
    state: Arc<Mutex<TreeState>>,
    id: usize,
}

impl MemoryElement {
    pub fn node_id(&self) -> NodeId {
        NodeId(self.id)
    }

    fn wrap(&self, id: usize) -> NativeHandle {
        NativeHandle::new(MemoryElement {
            state: self.state.clone(),
            id,
        })
    }
}

impl fmt::Debug for MemoryElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.state);
        match state.nodes.get(self.id) {
            Some(node) => write!(f, "MemoryElement({}, {})", self.id, node.role),
            None => write!(f, "MemoryElement({})", self.id),
        }
    }
}

impl NativeElementImpl for MemoryElement {
    fn address(&self) -> usize {
        self.id + 1
    }

    fn attribute(&self, name: &str) -> Result<Option<AttributeValue>, NativeError> {
        let delay = lock(&self.state).read_delays.get(&self.id).copied();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        let mut state = lock(&self.state);
        state.node(self.id)?;
        state.take_transient(self.id)?;
        let node = state.node(self.id)?;
        if name == ATTR_ROLE {
            return Ok(Some(AttributeValue::String(node.role.clone())));
        }
        Ok(node.attributes.get(name).cloned())
    }

    fn element_attribute(&self, _name: &str) -> Result<Option<NativeHandle>, NativeError> {
        lock(&self.state).node(self.id)?;
        Ok(None)
    }

    fn children(&self) -> Result<Vec<NativeHandle>, NativeError> {
        let mut state = lock(&self.state);
        state.node(self.id)?;
        state.take_transient(self.id)?;
        let ids = state.visible_children(self.id)?;
        drop(state);
        Ok(ids.into_iter().map(|id| self.wrap(id)).collect())
    }

    fn parent(&self) -> Result<Option<NativeHandle>, NativeError> {
        let parent = lock(&self.state).node(self.id)?.parent;
        Ok(parent.map(|id| self.wrap(id)))
    }

    fn action_names(&self) -> Result<Vec<String>, NativeError> {
        Ok(lock(&self.state).node(self.id)?.actions.clone())
    }

    fn perform_action(&self, action: &str) -> Result<(), NativeError> {
        lock(&self.state).perform(self.id, action)
    }

    fn set_attribute(&self, name: &str, value: AttributeValue) -> Result<(), NativeError> {
        let mut state = lock(&self.state);
        let node = state.node(self.id)?;
        if !node.settable.contains(name) {
            return Err(NativeError::AttributeUnsupported);
        }
        if let Some(err) = state.failing_sets.get(&(self.id, name.to_string())) {
            return Err(*err);
        }
        state.set_log.push((NodeId(self.id), name.to_string(), value.clone()));
        state.nodes[self.id]
            .attributes
            .insert(name.to_string(), value);
        Ok(())
    }

    fn process_id(&self) -> Result<i32, NativeError> {
        Ok(lock(&self.state).node(self.id)?.pid)
    }

    fn same_element(&self, other: &dyn NativeElementImpl) -> bool {
        other
            .as_any()
            .downcast_ref::<MemoryElement>()
            .is_some_and(|o| o.id == self.id && Arc::ptr_eq(&o.state, &self.state))
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// Engine over a [`MemoryTree`].
pub struct MemoryEngine {
    tree: MemoryTree,
    trusted: AtomicBool,
    focused_pid: Mutex<Option<i32>>,
}

impl MemoryEngine {
    pub fn new(tree: MemoryTree) -> Self {
        Self {
            tree,
            trusted: AtomicBool::new(true),
            focused_pid: Mutex::new(None),
        }
    }

    pub fn tree(&self) -> &MemoryTree {
        &self.tree
    }

    pub fn set_trusted(&self, trusted: bool) {
        self.trusted.store(trusted, Ordering::SeqCst);
    }

    pub fn set_focused(&self, pid: i32) {
        *self
            .focused_pid
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(pid);
    }
}

impl AccessibilityEngine for MemoryEngine {
    fn system_wide(&self) -> Result<NativeHandle, AutomationError> {
        Ok(self.tree.handle(self.tree.root()))
    }

    fn focused_application(&self) -> Result<NativeHandle, AutomationError> {
        let focused = *self
            .focused_pid
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let pid = focused
            .or_else(|| self.tree.processes().first().map(|p| p.pid))
            .ok_or_else(|| AutomationError::ApplicationNotFound("focused".to_string()))?;
        self.application(pid)
    }

    fn application(&self, pid: i32) -> Result<NativeHandle, AutomationError> {
        self.tree
            .application_node(pid)
            .map(|id| self.tree.handle(NodeId(id)))
            .ok_or_else(|| AutomationError::ApplicationNotFound(format!("pid {pid}")))
    }

    fn element_at_position(&self, position: Point) -> Result<NativeHandle, AutomationError> {
        self.tree
            .hit_test(self.tree.root, position)
            .map(|id| self.tree.handle(NodeId(id)))
            .ok_or_else(|| {
                AutomationError::ElementNotFound(format!(
                    "No element at ({}, {})",
                    position.x, position.y
                ))
            })
    }

    fn is_trusted(&self) -> bool {
        self.trusted.load(Ordering::SeqCst)
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// A fixed list of running applications.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDirectory {
    processes: Vec<ProcessHandle>,
}

impl InMemoryDirectory {
    pub fn new(processes: Vec<ProcessHandle>) -> Self {
        Self { processes }
    }

    pub fn from_tree(tree: &MemoryTree) -> Self {
        Self::new(tree.processes())
    }
}

impl ApplicationDirectory for InMemoryDirectory {
    fn find_running_application(&self, id: &str) -> Option<ProcessHandle> {
        self.processes.iter().find(|p| p.matches(id)).cloned()
    }
}

/// Records every posted event instead of delivering it.
#[derive(Debug, Default)]
pub struct RecordingInput {
    events: Mutex<Vec<InputEvent>>,
    fail: AtomicBool,
}

impl RecordingInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent post fail.
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    fn record(&self, event: InputEvent) -> Result<(), AutomationError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AutomationError::PlatformError(
                "input backend rejected event".to_string(),
            ));
        }
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
        Ok(())
    }

    pub fn events(&self) -> Vec<InputEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }

    pub fn mouse_events(&self) -> Vec<MouseEvent> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                InputEvent::Mouse(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    /// Mouse-down and mouse-up events only.
    pub fn clicks(&self) -> Vec<MouseEvent> {
        self.mouse_events()
            .into_iter()
            .filter(|m| matches!(m.kind, MouseEventKind::Down | MouseEventKind::Up))
            .collect()
    }

    pub fn key_events(&self) -> Vec<KeyEvent> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                InputEvent::Key(k) => Some(k),
                _ => None,
            })
            .collect()
    }

    pub fn scroll_events(&self) -> Vec<ScrollEvent> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                InputEvent::Scroll(s) => Some(s),
                _ => None,
            })
            .collect()
    }
}

impl InputBackend for RecordingInput {
    fn post_mouse_event(&self, event: &MouseEvent) -> Result<(), AutomationError> {
        self.record(InputEvent::Mouse(*event))
    }

    fn post_key_event(&self, event: &KeyEvent) -> Result<(), AutomationError> {
        self.record(InputEvent::Key(*event))
    }

    fn post_scroll_event(&self, event: &ScrollEvent) -> Result<(), AutomationError> {
        self.record(InputEvent::Scroll(*event))
    }
}

/// Engine, directory and recording input over one tree, plus handles to inspect them.
pub struct MemoryBackend {
    pub tree: MemoryTree,
    pub engine: Arc<MemoryEngine>,
    pub input: Arc<RecordingInput>,
}

impl MemoryBackend {
    pub fn new(tree: MemoryTree) -> Self {
        Self {
            engine: Arc::new(MemoryEngine::new(tree.clone())),
            input: Arc::new(RecordingInput::new()),
            tree,
        }
    }

    pub fn platform(&self) -> PlatformBackend {
        PlatformBackend {
            engine: self.engine.clone(),
            directory: Arc::new(InMemoryDirectory::from_tree(&self.tree)),
            input: self.input.clone(),
        }
    }
}
