//! Scroll preservation around list mutations.

/// Anything that scrolls vertically over content taller than itself.
pub trait ScrollViewport {
    fn scroll_top(&self) -> f32;
    fn scroll_height(&self) -> f32;
    fn client_height(&self) -> f32;
    fn set_scroll_top(&mut self, value: f32);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollMode {
    /// Content is inserted above: keep the same item under the viewport.
    PreservePosition,
    /// Content is appended: follow it if the reader was at the bottom.
    StickToBottom,
}

pub fn is_near_bottom<V: ScrollViewport + ?Sized>(viewport: &V, threshold: f32) -> bool {
    viewport.scroll_height() - viewport.scroll_top() - viewport.client_height() <= threshold
}

pub fn scroll_to_bottom<V: ScrollViewport + ?Sized>(viewport: &mut V) {
    let bottom = (viewport.scroll_height() - viewport.client_height()).max(0.0);
    viewport.set_scroll_top(bottom);
}

#[derive(Debug, Clone, Copy)]
pub struct ScrollController {
    threshold: f32,
}

impl ScrollController {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold: threshold.max(0.0),
        }
    }

    /// Run `mutate` against the viewport's content and restore the scroll
    /// position according to `mode`.
    pub fn apply<V, R>(&self, viewport: &mut V, mode: ScrollMode, mutate: impl FnOnce(&mut V) -> R) -> R
    where
        V: ScrollViewport + ?Sized,
    {
        match mode {
            ScrollMode::PreservePosition => {
                let top = viewport.scroll_top();
                let height = viewport.scroll_height();
                let result = mutate(&mut *viewport);
                let delta = viewport.scroll_height() - height;
                viewport.set_scroll_top(top + delta);
                result
            }
            ScrollMode::StickToBottom => {
                let near_bottom = is_near_bottom(&*viewport, self.threshold);
                let result = mutate(&mut *viewport);
                if near_bottom {
                    scroll_to_bottom(viewport);
                }
                result
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Pixel viewport over a list of fixed-height items.
    struct FakeList {
        items: usize,
        item_height: f32,
        client_height: f32,
        top: f32,
    }

    impl ScrollViewport for FakeList {
        fn scroll_top(&self) -> f32 {
            self.top
        }
        fn scroll_height(&self) -> f32 {
            self.items as f32 * self.item_height
        }
        fn client_height(&self) -> f32 {
            self.client_height
        }
        fn set_scroll_top(&mut self, value: f32) {
            self.top = value;
        }
    }

    fn list(items: usize, top: f32) -> FakeList {
        FakeList {
            items,
            item_height: 20.0,
            client_height: 400.0,
            top,
        }
    }

    #[test]
    fn test_prepend_keeps_reading_position() {
        let controller = ScrollController::new(50.0);
        let mut view = list(40, 120.0);

        controller.apply(&mut view, ScrollMode::PreservePosition, |v| v.items += 20);

        assert_eq!(view.top, 120.0 + 400.0);
    }

    #[test]
    fn test_append_follows_when_near_bottom() {
        let controller = ScrollController::new(50.0);
        // 800 - 370 - 400 = 30, within the threshold
        let mut view = list(40, 370.0);

        controller.apply(&mut view, ScrollMode::StickToBottom, |v| v.items += 5);

        assert_eq!(view.top, 900.0 - 400.0);
    }

    #[test]
    fn test_append_leaves_reader_alone_when_scrolled_up() {
        let controller = ScrollController::new(50.0);
        let mut view = list(40, 100.0);

        controller.apply(&mut view, ScrollMode::StickToBottom, |v| v.items += 5);

        assert_eq!(view.top, 100.0);
    }

    #[test]
    fn test_short_content_scrolls_to_zero() {
        let mut view = list(3, 0.0);
        assert!(is_near_bottom(&view, 0.0));
        scroll_to_bottom(&mut view);
        assert_eq!(view.top, 0.0);
    }
}
