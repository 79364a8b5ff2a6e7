//! PC-006: Copy-on-write lexical scope.
//!
//! A scope maps names to unevaluated nodes. Bindings that carry their own
//! scope are closures (call arguments, lambda defaults). Frame bindings are
//! output options: they evaluate in the output's completed scope, which also
//! holds `out` and their siblings, wherever they are looked up from.

use super::ast::NodeRef;
use indexmap::IndexMap;
use std::cell::OnceCell;
use std::rc::{Rc, Weak};

/// Where a bound node is evaluated.
#[derive(Debug, Clone)]
pub enum Context {
    /// In the scope that looked the name up.
    Dynamic,
    /// In a captured scope.
    Captured(Scope),
    /// In a frame closed after its bindings were made.
    Frame(Weak<OnceCell<Scope>>),
}

/// A name bound to a node, and the scope that node evaluates in.
#[derive(Debug, Clone)]
pub struct Binding {
    pub node: NodeRef,
    pub context: Context,
}

impl Binding {
    /// The scope to evaluate the node in when it was found from `current`.
    /// `None` once the frame it belongs to has been dropped or was never closed.
    pub fn scope_in(&self, current: &Scope) -> Option<Scope> {
        match &self.context {
            Context::Dynamic => Some(current.clone()),
            Context::Captured(scope) => Some(scope.clone()),
            Context::Frame(frame) => frame.upgrade().and_then(|f| f.get().cloned()),
        }
    }
}

/// A scope whose bindings may refer to each other. Bind into it with
/// [`Scope::set_in_frame`], then [`Frame::close`] it over the finished scope.
/// Bindings only resolve while the `Frame` itself is alive.
#[derive(Debug, Default)]
pub struct Frame(Rc<OnceCell<Scope>>);

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn close(&self, scope: Scope) {
        // A frame is closed once; later calls keep the first scope.
        let _ = self.0.set(scope);
    }
}

/// Ordered name → binding map. Cloning is cheap; `set` never mutates a scope
/// that another clone can observe.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    bindings: Rc<IndexMap<String, Binding>>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a new scope with `name` bound, replacing any older binding.
    /// `Some(scope)` makes a closure; `None` evaluates where it is looked up.
    pub fn set(&self, name: &str, node: NodeRef, scope: Option<Scope>) -> Scope {
        let context = match scope {
            Some(scope) => Context::Captured(scope),
            None => Context::Dynamic,
        };
        self.bind(name, Binding { node, context })
    }

    /// Return a new scope with `name` bound to evaluate in `frame`.
    pub fn set_in_frame(&self, name: &str, node: NodeRef, frame: &Frame) -> Scope {
        let context = Context::Frame(Rc::downgrade(&frame.0));
        self.bind(name, Binding { node, context })
    }

    fn bind(&self, name: &str, binding: Binding) -> Scope {
        let mut next = self.clone();
        let map = Rc::make_mut(&mut next.bindings);
        map.shift_remove(name);
        map.insert(name.to_string(), binding);
        next
    }

    /// Return a new scope without `name`.
    pub fn without(&self, name: &str) -> Scope {
        if !self.bindings.contains_key(name) {
            return self.clone();
        }
        let mut next = self.clone();
        Rc::make_mut(&mut next.bindings).shift_remove(name);
        next
    }

    pub fn get(&self, name: &str) -> Option<&Binding> {
        self.bindings.get(name)
    }

    /// Bound names, oldest first.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// Levenshtein edit distance over chars.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Maximum edit distance for a "do you mean" suggestion.
pub const SUGGEST_DISTANCE: usize = 3;

impl Scope {
    /// The bound name closest to `name`, if any is within [`SUGGEST_DISTANCE`].
    /// Ties go to the newest binding.
    pub fn suggest(&self, name: &str) -> Option<&str> {
        let mut best: Option<(usize, &str)> = None;
        for candidate in self.names() {
            let d = levenshtein(name, candidate);
            if d > SUGGEST_DISTANCE {
                continue;
            }
            if best.is_none_or(|(bd, _)| d <= bd) {
                best = Some((d, candidate));
            }
        }
        best.map(|(_, n)| n)
    }
}
