#![allow(missing_docs)]

use std::cell::Cell;
use std::rc::Rc;

use parking_lot::Once;

use crate::comp;

pub(crate) fn init() {
    static SET_LOGGER_ONCE: Once = Once::new();
    SET_LOGGER_ONCE.call_once(env_logger::init);
}

/// A plain swap-and-pop component.
#[comp(sparsec_as(crate))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position(pub i32, pub i32);

/// Another plain swap-and-pop component.
#[comp(sparsec_as(crate))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Velocity(pub i32, pub i32);

/// A third plain component, used to build nested groups.
#[comp(sparsec_as(crate))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Health(pub u32);

/// An in-place component with a small page size to exercise page boundaries.
#[comp(sparsec_as(crate), in_place, page_size = 4)]
#[derive(Debug, Clone, PartialEq)]
pub struct Stable(pub String);

/// An empty component, elided from payload storage.
#[comp(sparsec_as(crate))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Tag;

/// Counts how many times its values were dropped.
#[comp(sparsec_as(crate), page_size = 2)]
#[derive(Debug)]
pub struct Counted {
    pub value:   i32,
    pub counter: Rc<Cell<usize>>,
}

impl Counted {
    pub fn new(value: i32, counter: &Rc<Cell<usize>>) -> Self {
        Self { value, counter: Rc::clone(counter) }
    }
}

impl Drop for Counted {
    fn drop(&mut self) { self.counter.set(self.counter.get() + 1); }
}
