use alloc::boxed::Box;
use core::{
    cell::UnsafeCell, fmt, marker::PhantomData, marker::PhantomPinned, mem, ops::Not,
    ptr::NonNull,
};

use cordyceps::Linked;

use crate::{Key, WavlTree};

pub(crate) type Link<T> = Option<NonNull<T>>;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Dir {
    Left = 0,
    Right = 1,
}

impl Not for Dir {
    type Output = Dir;

    fn not(self) -> Self::Output {
        match self {
            Dir::Left => Dir::Right,
            Dir::Right => Dir::Left,
        }
    }
}

/// Structural links embedded in every tree node.
pub(crate) struct Links<T: ?Sized> {
    inner: UnsafeCell<LinksInner<T>>,
}

#[repr(C)]
struct LinksInner<T: ?Sized> {
    parent: Link<T>,
    children: [Link<T>; 2],
    rank: i8,
    size: usize,
    _unpin: PhantomPinned,
}

impl<T: ?Sized> Links<T> {
    /// Links for a freshly inserted leaf: rank 0, size 1, no relatives.
    #[must_use]
    pub(crate) const fn new() -> Self {
        Self {
            inner: UnsafeCell::new(LinksInner {
                parent: None,
                children: [None; 2],
                rank: 0,
                size: 1,
                _unpin: PhantomPinned,
            }),
        }
    }

    #[inline]
    pub(crate) fn is_leaf(&self) -> bool {
        self.left().is_none() && self.right().is_none()
    }

    #[inline]
    pub(crate) fn rank(&self) -> i8 {
        unsafe { (*self.inner.get()).rank }
    }

    #[inline]
    pub(crate) fn size(&self) -> usize {
        unsafe { (*self.inner.get()).size }
    }

    #[inline]
    pub(crate) fn parent(&self) -> Link<T> {
        unsafe { (*self.inner.get()).parent }
    }

    #[inline]
    pub(crate) fn child(&self, dir: Dir) -> Link<T> {
        unsafe { (*self.inner.get()).children[dir as usize] }
    }

    #[inline]
    pub(crate) fn left(&self) -> Link<T> {
        self.child(Dir::Left)
    }

    #[inline]
    pub(crate) fn right(&self) -> Link<T> {
        self.child(Dir::Right)
    }

    #[inline]
    pub(crate) fn set_parent(&mut self, parent: Link<T>) -> Link<T> {
        mem::replace(&mut self.inner.get_mut().parent, parent)
    }

    #[inline]
    pub(crate) fn set_child(&mut self, dir: Dir, child: Link<T>) -> Link<T> {
        mem::replace(&mut self.inner.get_mut().children[dir as usize], child)
    }

    #[inline]
    pub(crate) fn set_rank(&mut self, rank: i8) {
        self.inner.get_mut().rank = rank;
    }

    #[inline]
    pub(crate) fn set_size(&mut self, size: usize) {
        self.inner.get_mut().size = size;
    }
}

/// A stored key-value pair together with its tree links.
pub(crate) struct Node<V> {
    links: Links<Node<V>>,
    pub(crate) key: Key,
    pub(crate) value: V,
}

impl<V> Node<V> {
    pub(crate) fn new(key: Key, value: V) -> Box<Node<V>> {
        Box::new(Node {
            links: Links::new(),
            key,
            value,
        })
    }
}

unsafe impl<V> Linked<Links<Node<V>>> for Node<V> {
    type Handle = Box<Self>;

    fn into_ptr(r: Self::Handle) -> NonNull<Self> {
        Box::leak(r).into()
    }

    unsafe fn from_ptr(ptr: NonNull<Self>) -> Self::Handle {
        unsafe { Box::from_raw(ptr.as_ptr()) }
    }

    unsafe fn links(ptr: NonNull<Self>) -> NonNull<Links<Node<V>>> {
        let ptr = ptr.as_ptr();
        unsafe { NonNull::new_unchecked(core::ptr::addr_of_mut!((*ptr).links)) }
    }
}

/// Returns the rank of a possibly absent node. Absent children rank -1.
///
/// # Safety
///
/// `link`, if present, must point to a live node.
#[inline]
pub(crate) unsafe fn rank<V>(link: Link<Node<V>>) -> i8 {
    link.map(|n| unsafe { Node::links(n).as_ref().rank() })
        .unwrap_or(-1)
}

/// Returns the subtree size of a possibly absent node. Absent children are empty.
///
/// # Safety
///
/// `link`, if present, must point to a live node.
#[inline]
pub(crate) unsafe fn size<V>(link: Link<Node<V>>) -> usize {
    link.map(|n| unsafe { Node::links(n).as_ref().size() })
        .unwrap_or(0)
}

/// A read-only position in a [`WavlTree`].
///
/// A position is either an internal node holding a key and value, or an external position
/// standing in for a missing child. External positions always report rank -1 and subtree size
/// 0, and have no key, value or parent.
pub struct NodeView<'tree, V> {
    link: Link<Node<V>>,
    _tree: PhantomData<&'tree WavlTree<V>>,
}

impl<V> Clone for NodeView<'_, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<V> Copy for NodeView<'_, V> {}

impl<'tree, V> NodeView<'tree, V> {
    pub(crate) fn new(link: Link<Node<V>>) -> Self {
        NodeView {
            link,
            _tree: PhantomData,
        }
    }

    fn node(&self) -> Option<&'tree Node<V>> {
        self.link.map(|n| unsafe { &*n.as_ptr() })
    }

    fn links(&self) -> Option<&'tree Links<Node<V>>> {
        self.link.map(|n| unsafe { Node::links(n).as_ref() })
    }

    /// Returns `true` if this position holds a key.
    pub fn is_internal(&self) -> bool {
        self.link.is_some()
    }

    /// Returns the key held here, or `None` for an external position.
    pub fn key(&self) -> Option<Key> {
        self.node().map(|node| node.key)
    }

    /// Returns the value held here, or `None` for an external position.
    pub fn value(&self) -> Option<&'tree V> {
        self.node().map(|node| &node.value)
    }

    /// Returns the rank of this position. External positions rank -1.
    pub fn rank(&self) -> i8 {
        unsafe { rank(self.link) }
    }

    /// Returns the number of keys stored in the subtree rooted here.
    pub fn subtree_size(&self) -> usize {
        unsafe { size(self.link) }
    }

    /// Returns the left child position. The children of an external position are external.
    pub fn left(&self) -> NodeView<'tree, V> {
        NodeView::new(self.links().and_then(Links::left))
    }

    /// Returns the right child position. The children of an external position are external.
    pub fn right(&self) -> NodeView<'tree, V> {
        NodeView::new(self.links().and_then(Links::right))
    }

    /// Returns the parent, or `None` for the root and for external positions.
    pub fn parent(&self) -> Option<NodeView<'tree, V>> {
        self.links()
            .and_then(Links::parent)
            .map(|p| NodeView::new(Some(p)))
    }
}

impl<V> PartialEq for NodeView<'_, V> {
    fn eq(&self, other: &Self) -> bool {
        self.link == other.link
    }
}

impl<V> Eq for NodeView<'_, V> {}

impl<V: fmt::Debug> fmt::Debug for NodeView<'_, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.node() {
            Some(node) => f
                .debug_struct("NodeView")
                .field("key", &node.key)
                .field("value", &node.value)
                .field("rank", &self.rank())
                .field("size", &self.subtree_size())
                .finish(),
            None => f.write_str("NodeView(external)"),
        }
    }
}
