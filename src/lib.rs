//! Restricted regular expressions compiled to an explicit state graph.
//!
//! The supported grammar is deliberately small:
//!
//! | Pattern | Meaning                                   |
//! |---------|-------------------------------------------|
//! | `a`–`z`, `A`–`Z`, `0`–`9` | match that exact byte       |
//! | `.`     | match any single byte                     |
//! | `X*`    | zero or more repetitions of atom `X`      |
//! | `X+`    | one or more repetitions of atom `X`       |
//!
//! Concatenation is implicit and a match always spans the whole input.
//!
//! # Architecture
//!
//! ```text
//! pattern ──RegexBuilder::build──>  node arena (Regex)  ──Matcher::step──>  bool
//! ```
//!
//! Every pattern becomes a chain of nodes hanging off a single `Start`
//! node.  Quantified atoms are wrapped in `ZeroOrMore` / `OneOrMore` nodes
//! that keep the bare atom as a free-standing `inner` node and loop on it.
//! A `ZeroOrMore` node also remembers the chain node that preceded it so
//! the compiler can add a skip edge around the loop:
//!
//! ```text
//!           ┌──────── skip ────────┐
//!           │                      v
//!  Start ──> a* ──> 4 ──> .+ ──> h ──> i     (pattern `a*4.+hi`)
//!           ↺a            ↺.
//! ```
//!
//! Nodes live in an arena and refer to each other by `NodeIdx`, so the
//! back-references that make the graph cyclic are plain integers.
//!
//! ## Matching
//!
//! Each node resolves an input byte into an *ordered* list of successor
//! nodes (first entry = preferred).  A single cursor that always takes the
//! preferred entry is greedy and cannot back off: on `a*4.+hi` the `.+`
//! loop would swallow `hi` and reject `4uhi`.  The [`Matcher`] therefore
//! keeps every live cursor in an insertion-ordered set, in the spirit of a
//! Thompson simulation, and accepts when any cursor left after the last
//! byte sits on an accepting node.
//!
//! All per-match state (the cursor sets, visit stamps and the `OneOrMore`
//! "minimum satisfied" flags) lives in [`MatcherMemory`], never in the
//! compiled [`Regex`].  A `Regex` can be shared between threads and matched
//! concurrently, one `MatcherMemory` per thread.

use std::fmt;
use std::io::{self, Write};
use std::ops::Index;
use std::str::FromStr;

use indexmap::IndexSet;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// An error returned when a pattern cannot be compiled.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Error {
    /// A symbol that is neither an ASCII letter or digit, `.`, `*` nor `+`.
    #[error("unsupported pattern symbol {symbol:?} at position {position}")]
    UnsupportedPatternSymbol { symbol: char, position: usize },
    /// A `*` or `+` with no atom to repeat: either leading the pattern or
    /// directly following another quantifier.
    #[error("quantifier {quantifier:?} at position {position} does not follow an atom")]
    DanglingQuantifier { quantifier: char, position: usize },
}

impl Error {
    /// Byte offset of the offending symbol in the pattern.
    pub fn position(&self) -> usize {
        match *self {
            Self::UnsupportedPatternSymbol { position, .. }
            | Self::DanglingQuantifier { position, .. } => position,
        }
    }
}

// ---------------------------------------------------------------------------
// State graph
// ---------------------------------------------------------------------------

/// The kind of a node, together with its payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum NodeKind {
    /// Entry marker.  Only ever dispatches to its successors.
    Start,
    /// Absorbing reject sink.  Its only successor is itself.
    Termination,
    /// Match exactly this byte.
    Literal(u8),
    /// Match any single byte.
    AnyChar,
    /// Repeat `inner` zero or more times.
    ///
    /// `prev` is the chain node that preceded this loop when it was built.
    /// It is a back-reference only; the compiler uses it to link the skip
    /// path around the loop.
    ZeroOrMore { inner: NodeIdx, prev: NodeIdx },
    /// Repeat `inner` one or more times.
    OneOrMore { inner: NodeIdx },
}

#[derive(Clone, Debug)]
struct Node {
    kind: NodeKind,
    /// Visited in insertion order; earlier entries are preferred.
    successors: Vec<NodeIdx>,
    /// Reaching this node at end-of-input is a successful match.
    is_end: bool,
}

impl Node {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            successors: Vec::new(),
            is_end: false,
        }
    }
}

/// Index into the node arena ([`Regex::nodes`]).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct NodeIdx(u32);

impl NodeIdx {
    /// Every graph is rooted here.
    const START: Self = Self(0);
    /// The shared reject sink, allocated right after `START`.
    const TERMINATION: Self = Self(1);

    #[inline]
    fn idx(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeIdx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `nodes[node_idx]`: typed access to the node arena.
impl Index<NodeIdx> for [Node] {
    type Output = Node;

    #[inline]
    fn index(&self, idx: NodeIdx) -> &Node {
        &self[idx.idx()]
    }
}

/// Per-node contracts that need to look through `inner` references.
trait NodeSliceExt {
    /// Does the atom of node `idx` accept `byte`?
    fn self_test(&self, idx: NodeIdx, byte: u8) -> bool;

    /// Short pattern-like rendering of node `idx` (`a`, `.`, `a*`, ...).
    fn label(&self, idx: NodeIdx) -> String;
}

impl NodeSliceExt for [Node] {
    fn self_test(&self, idx: NodeIdx, byte: u8) -> bool {
        match self[idx].kind {
            // `Start` never consumes input.
            NodeKind::Start => false,
            NodeKind::Termination | NodeKind::AnyChar => true,
            NodeKind::Literal(symbol) => symbol == byte,
            NodeKind::ZeroOrMore { inner, .. } | NodeKind::OneOrMore { inner } => {
                self.self_test(inner, byte)
            }
        }
    }

    fn label(&self, idx: NodeIdx) -> String {
        match self[idx].kind {
            NodeKind::Start => "start".to_owned(),
            NodeKind::Termination => "reject".to_owned(),
            NodeKind::Literal(symbol) => (symbol as char).to_string(),
            NodeKind::AnyChar => ".".to_owned(),
            NodeKind::ZeroOrMore { inner, .. } => format!("{}*", self.label(inner)),
            NodeKind::OneOrMore { inner } => format!("{}+", self.label(inner)),
        }
    }
}

// ---------------------------------------------------------------------------
// Compiled regex
// ---------------------------------------------------------------------------

struct NodeList(Box<[Node]>);

impl fmt::Debug for NodeList {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_map().entries(self.0.iter().enumerate()).finish()
    }
}

impl std::ops::Deref for NodeList {
    type Target = [Node];
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// A compiled pattern ready for matching.
///
/// The graph is immutable once built.  Matching borrows it through a
/// [`MatcherMemory`], so one `Regex` can serve any number of match calls,
/// including concurrent ones.
#[derive(Debug)]
pub struct Regex {
    pattern: Box<str>,
    nodes: NodeList,
}

impl Regex {
    /// Compile `pattern` with a throwaway [`RegexBuilder`].
    pub fn new(pattern: &str) -> Result<Self, Error> {
        RegexBuilder::default().build(pattern)
    }

    /// The pattern this regex was compiled from.
    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    /// Number of nodes in the state graph, including the `Start` node, the
    /// reject sink and the atoms wrapped by quantifiers.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Match the whole of `input` against this regex.
    ///
    /// Allocates a fresh [`MatcherMemory`]; reuse one explicitly when
    /// matching many inputs.
    pub fn is_match(&self, input: impl AsRef<[u8]>) -> bool {
        let mut memory = MatcherMemory::default();
        let mut matcher = memory.matcher(self);
        matcher.chunk(input.as_ref());
        matcher.finish()
    }

    /// Return the total memory footprint (in bytes) of this compiled
    /// regex, including both inline and heap-allocated data.
    pub fn memory_size(&self) -> usize {
        let inline = std::mem::size_of::<Self>();
        let pattern_alloc = self.pattern.len();
        let nodes_alloc = self.nodes.len() * std::mem::size_of::<Node>();
        let successors_alloc: usize = self
            .nodes
            .iter()
            .map(|n| n.successors.capacity() * std::mem::size_of::<NodeIdx>())
            .sum();
        inline + pattern_alloc + nodes_alloc + successors_alloc
    }

    /// Emit a Graphviz DOT representation of the state graph.
    ///
    /// Accepting nodes are drawn with a double border, loops as self
    /// edges labelled with their atom and `ZeroOrMore` back-references as
    /// dashed edges.  Only nodes reachable from `Start` are emitted.
    pub fn to_dot(&self, mut buffer: impl Write) -> io::Result<()> {
        let mut visited = vec![false; self.nodes.len()];
        writeln!(buffer, "digraph graphname {{")?;
        writeln!(buffer, "\trankdir=LR;")?;
        writeln!(buffer, "\t{} [shape=box];", NodeIdx::START)?;
        let mut stack = vec![NodeIdx::START];
        while let Some(idx) = stack.pop() {
            if visited[idx.idx()] {
                continue;
            }
            visited[idx.idx()] = true;

            let node = &self.nodes[idx];
            writeln!(buffer, "\t// [{}] {}", idx, self.nodes.label(idx))?;
            if node.is_end {
                writeln!(buffer, "\t{} [peripheries=2];", idx)?;
            }
            match node.kind {
                NodeKind::ZeroOrMore { inner, prev } => {
                    let atom = self.nodes.label(inner);
                    writeln!(buffer, "\t{} -> {} [label=\"{}\"];", idx, idx, atom)?;
                    writeln!(buffer, "\t{} -> {} [style=dashed];", idx, prev)?;
                }
                NodeKind::OneOrMore { inner } => {
                    let atom = self.nodes.label(inner);
                    writeln!(buffer, "\t{} -> {} [label=\"{}\"];", idx, idx, atom)?;
                }
                _ => {}
            }
            for &succ in &node.successors {
                writeln!(
                    buffer,
                    "\t{} -> {} [label=\"{}\"];",
                    idx,
                    succ,
                    self.nodes.label(succ)
                )?;
                stack.push(succ);
            }
        }
        writeln!(buffer, "}}")
    }
}

impl fmt::Display for Regex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pattern)
    }
}

impl FromStr for Regex {
    type Err = Error;

    fn from_str(pattern: &str) -> Result<Self, Error> {
        Self::new(pattern)
    }
}

/// Compile `pattern` into a [`Regex`].
pub fn compile(pattern: &str) -> Result<Regex, Error> {
    Regex::new(pattern)
}

/// Whole-input match of `input` against a compiled `regex`.
pub fn matches(regex: &Regex, input: &str) -> bool {
    regex.is_match(input)
}

// ---------------------------------------------------------------------------
// Compiler (pattern -> state graph)
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Quantifier {
    ZeroOrMore,
    OneOrMore,
}

impl Quantifier {
    fn from_symbol(symbol: char) -> Option<Self> {
        match symbol {
            '*' => Some(Self::ZeroOrMore),
            '+' => Some(Self::OneOrMore),
            _ => None,
        }
    }
}

/// Builds a compiled [`Regex`] from a pattern string.
///
/// The pattern is scanned left to right.  Each atom becomes a node; a
/// quantifier is never a token of its own but is picked up by one symbol
/// of lookahead and wraps the atom it follows.  Every new node is linked
/// from the previous chain node, and additionally from the node *before*
/// that one when the previous node is a `ZeroOrMore` loop, so the looped
/// and the skipped path converge on the same successor.
///
/// The builder keeps its scratch buffers between calls to
/// [`build`](Self::build).
#[derive(Debug, Default)]
pub struct RegexBuilder {
    nodes: Vec<Node>,
    /// Chain nodes in pattern order, starting with `Start`.  Wrapped atoms
    /// are not part of the chain.
    chain: Vec<NodeIdx>,
}

impl RegexBuilder {
    /// Allocate a new node and return its index.
    fn node(&mut self, kind: NodeKind) -> NodeIdx {
        let idx = NodeIdx(self.nodes.len() as u32);
        self.nodes.push(Node::new(kind));
        idx
    }

    fn atom(&mut self, symbol: char, position: usize) -> Result<NodeIdx, Error> {
        let kind = match symbol {
            '.' => NodeKind::AnyChar,
            // Quantifiers that follow an atom are consumed by lookahead, so
            // one showing up here has nothing to repeat.
            '*' | '+' => {
                return Err(Error::DanglingQuantifier {
                    quantifier: symbol,
                    position,
                });
            }
            c if c.is_ascii_alphanumeric() => NodeKind::Literal(c as u8),
            _ => return Err(Error::UnsupportedPatternSymbol { symbol, position }),
        };
        Ok(self.node(kind))
    }

    fn quantify(&mut self, quantifier: Quantifier, inner: NodeIdx, prev: NodeIdx) -> NodeIdx {
        match quantifier {
            Quantifier::ZeroOrMore => self.node(NodeKind::ZeroOrMore { inner, prev }),
            Quantifier::OneOrMore => self.node(NodeKind::OneOrMore { inner }),
        }
    }

    fn link(&mut self, prev: NodeIdx, next: NodeIdx) {
        self.nodes[prev.idx()].successors.push(next);
        if let NodeKind::ZeroOrMore { prev: before, .. } = self.nodes[prev.idx()].kind {
            self.nodes[before.idx()].successors.push(next);
        }
    }

    /// Mark the trailing run of `ZeroOrMore` nodes and the first node
    /// before them as accepting.  The chain always starts with `Start`, so
    /// a pattern made only of `*` loops accepts the empty input.
    fn mark_accepting(&mut self) {
        for &idx in self.chain.iter().rev() {
            let node = &mut self.nodes[idx.idx()];
            node.is_end = true;
            if !matches!(node.kind, NodeKind::ZeroOrMore { .. }) {
                break;
            }
        }
    }

    /// Compile `pattern` into a ready-to-match [`Regex`].
    pub fn build(&mut self, pattern: &str) -> Result<Regex, Error> {
        self.nodes.clear();
        self.chain.clear();

        let start = self.node(NodeKind::Start);
        let sink = self.node(NodeKind::Termination);
        debug_assert_eq!((start, sink), (NodeIdx::START, NodeIdx::TERMINATION));
        self.nodes[sink.idx()].successors.push(sink);
        self.chain.push(start);

        let mut prev = start;
        let mut symbols = pattern.char_indices().peekable();
        while let Some((position, symbol)) = symbols.next() {
            let atom = self.atom(symbol, position)?;
            let quantifier = symbols
                .peek()
                .and_then(|&(_, next)| Quantifier::from_symbol(next));
            let next = match quantifier {
                Some(quantifier) => {
                    symbols.next();
                    self.quantify(quantifier, atom, prev)
                }
                None => atom,
            };
            self.link(prev, next);
            self.chain.push(next);
            prev = next;
        }

        self.mark_accepting();

        Ok(Regex {
            pattern: pattern.into(),
            nodes: NodeList(self.nodes.to_vec().into_boxed_slice()),
        })
    }
}

// ---------------------------------------------------------------------------
// Matcher (state graph simulation)
// ---------------------------------------------------------------------------

/// Reusable memory for [`Matcher`].  Create once, call
/// [`matcher`](Self::matcher) for each input to match.
#[derive(Debug, Default)]
pub struct MatcherMemory {
    /// Per-node: the `listid` when a `ZeroOrMore` node was last expanded.
    /// Stops a step from walking the same skip path twice.
    lastlist: Vec<usize>,
    /// Worklist for walking successor edges through skipped loops.
    stack: Vec<NodeIdx>,
    /// Per-node: whether a `OneOrMore` node has consumed its mandatory
    /// first repetition during this match.
    satisfied: Vec<bool>,
    /// Current and next cursor sets (swapped each step).  Insertion order
    /// is preference order.
    clist: IndexSet<NodeIdx>,
    nlist: IndexSet<NodeIdx>,
}

impl MatcherMemory {
    pub fn matcher<'a>(&'a mut self, regex: &'a Regex) -> Matcher<'a> {
        self.lastlist.clear();
        self.lastlist.resize(regex.nodes.len(), usize::MAX);
        self.satisfied.clear();
        self.satisfied.resize(regex.nodes.len(), false);
        self.stack.clear();
        self.clist.clear();
        self.nlist.clear();
        self.clist.insert(NodeIdx::START);

        Matcher {
            nodes: &regex.nodes,
            lastlist: &mut self.lastlist,
            stack: &mut self.stack,
            satisfied: &mut self.satisfied,
            clist: &mut self.clist,
            nlist: &mut self.nlist,
            listid: 0,
            entered: 0,
        }
    }
}

/// Walks a compiled [`Regex`] one input byte at a time.
#[derive(Debug)]
pub struct Matcher<'a> {
    nodes: &'a [Node],
    /// Per-node expansion stamp (compared against `listid`).
    lastlist: &'a mut [usize],
    stack: &'a mut Vec<NodeIdx>,
    /// Per-node `OneOrMore` progress for this match only.
    satisfied: &'a mut [bool],
    /// Cursors before the current byte.
    clist: &'a mut IndexSet<NodeIdx>,
    /// Cursors after the current byte (built during a step).
    nlist: &'a mut IndexSet<NodeIdx>,
    /// Monotonically increasing step ID.
    listid: usize,
    /// Number of [`enter`](Self::enter) calls so far; lets
    /// [`advance`](Self::advance) tell whether a node produced anything.
    entered: usize,
}

impl<'a> Matcher<'a> {
    /// Place a cursor on `idx` for the next step.
    fn enter(&mut self, idx: NodeIdx) {
        // Entering a `OneOrMore` node consumes its first repetition.
        if let NodeKind::OneOrMore { .. } = self.nodes[idx].kind {
            self.satisfied[idx.idx()] = true;
        }
        self.nlist.insert(idx);
        self.entered += 1;
    }

    /// Offer `byte` to every successor of `idx`, in order.
    ///
    /// A `ZeroOrMore` successor is entered when its atom accepts the byte
    /// and is also skipped over (zero iterations), handing the byte on to
    /// its own successors.  Runs of loops are walked with an explicit
    /// worklist, so the depth does not grow with the pattern.
    fn follow(&mut self, idx: NodeIdx, byte: u8) {
        let nodes = self.nodes;
        self.stack.clear();
        self.stack.extend(nodes[idx].successors.iter().rev());
        while let Some(succ) = self.stack.pop() {
            match nodes[succ].kind {
                NodeKind::ZeroOrMore { inner, .. } => {
                    let i = succ.idx();
                    if self.lastlist[i] == self.listid {
                        continue;
                    }
                    self.lastlist[i] = self.listid;
                    if nodes.self_test(inner, byte) {
                        self.enter(succ);
                    }
                    // Reversed so successors pop in preference order.
                    self.stack.extend(nodes[succ].successors.iter().rev());
                }
                _ => {
                    if nodes.self_test(succ, byte) {
                        self.enter(succ);
                    }
                }
            }
        }
    }

    /// Resolve the cursor on `idx` against `byte`.
    ///
    /// Loops prefer staying on themselves over leaving.  A `OneOrMore`
    /// loop may only leave once its first repetition has been recorded;
    /// since a cursor only lands on one through [`enter`](Self::enter),
    /// which records that repetition, the record always exists here.
    /// A cursor that cannot go anywhere lands on the reject sink.
    fn advance(&mut self, idx: NodeIdx, byte: u8) {
        let nodes = self.nodes;
        let before = self.entered;
        match nodes[idx].kind {
            NodeKind::Start
            | NodeKind::Termination
            | NodeKind::Literal(_)
            | NodeKind::AnyChar => self.follow(idx, byte),
            NodeKind::ZeroOrMore { inner, .. } => {
                if nodes.self_test(inner, byte) {
                    self.enter(idx);
                }
                self.follow(idx, byte);
            }
            NodeKind::OneOrMore { inner } => {
                if nodes.self_test(inner, byte) {
                    self.enter(idx);
                }
                debug_assert!(
                    self.satisfied[idx.idx()],
                    "cursor on `+` node {idx} without a recorded repetition"
                );
                self.follow(idx, byte);
            }
        }
        if self.entered == before {
            self.enter(NodeIdx::TERMINATION);
        }
    }

    /// Advance every cursor by one input byte.
    pub fn step(&mut self, byte: u8) {
        self.listid += 1;
        self.nlist.clear();
        let clist = std::mem::take(self.clist);

        for &idx in &clist {
            self.advance(idx, byte);
        }

        *self.clist = std::mem::replace(self.nlist, clist);
    }

    /// Feed an entire byte slice through the matcher, one byte at a time.
    ///
    /// Stops early once every cursor has been rejected; the remaining
    /// bytes cannot change the outcome.
    pub fn chunk(&mut self, input: &[u8]) {
        for &b in input {
            if self.is_rejected() {
                return;
            }
            self.step(b);
        }
    }

    /// `true` when the only cursor left is the reject sink.
    pub fn is_rejected(&self) -> bool {
        self.clist.len() == 1 && self.clist.contains(&NodeIdx::TERMINATION)
    }

    /// Labels of the live cursors in preference order, leaving out the
    /// reject sink.
    pub fn cursor_labels(&self) -> Vec<String> {
        self.clist
            .iter()
            .filter(|&&idx| idx != NodeIdx::TERMINATION)
            .map(|&idx| self.nodes.label(idx))
            .collect()
    }

    /// Would the input consumed so far match if it ended here?
    pub fn is_accepting(&self) -> bool {
        self.clist.iter().any(|&idx| self.nodes[idx].is_end)
    }

    /// Signal end-of-input and return the final match result.
    pub fn finish(self) -> bool {
        self.is_accepting()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
