use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::RefCell;
use embedded_graphics::pixelcolor::Rgb888;

use crate::indicator::StatusIndicator;

/// Records every colour it is asked to show
#[derive(Debug, Clone, Default)]
pub struct MockIndicator {
    history: Rc<RefCell<Vec<Rgb888>>>,
}

impl MockIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> Vec<Rgb888> {
        self.history.borrow().clone()
    }

    pub fn current(&self) -> Option<Rgb888> {
        self.history.borrow().last().copied()
    }
}

impl StatusIndicator for MockIndicator {
    fn set_color(&mut self, color: Rgb888) {
        self.history.borrow_mut().push(color);
    }
}
