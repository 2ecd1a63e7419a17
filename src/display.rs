//! Windowed / fullscreen switching.

use log::{debug, info};
use winit::dpi::{PhysicalPosition, PhysicalSize};
use winit::monitor::MonitorHandle;
use winit::window::{Fullscreen, Window};

use crate::constants::WINDOWED_POSITION;

/// A rectangle in desktop coordinates, in physical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl ScreenRect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        ScreenRect {
            x,
            y,
            width,
            height,
        }
    }

    fn right(&self) -> i64 {
        self.x as i64 + self.width as i64
    }

    fn bottom(&self) -> i64 {
        self.y as i64 + self.height as i64
    }

    /// Area shared by both rectangles; zero when they do not intersect.
    pub fn overlap_area(&self, other: &ScreenRect) -> u64 {
        let horizontal = self.right().min(other.right()) - (self.x as i64).max(other.x as i64);
        let vertical = self.bottom().min(other.bottom()) - (self.y as i64).max(other.y as i64);
        horizontal.max(0) as u64 * vertical.max(0) as u64
    }
}

/// Index of the monitor sharing the most area with `window`. Ties keep the
/// earlier monitor; `None` when no monitor overlaps at all.
pub fn best_overlap(window: &ScreenRect, monitors: &[ScreenRect]) -> Option<usize> {
    let mut best = None;
    let mut best_area = 0;
    for (index, monitor) in monitors.iter().enumerate() {
        let area = window.overlap_area(monitor);
        if area > best_area {
            best_area = area;
            best = Some(index);
        }
    }
    best
}

/// The window operations fullscreen switching needs.
pub trait DisplayTarget {
    type Monitor: Clone;

    fn outer_rect(&self) -> ScreenRect;
    fn monitors(&self) -> Vec<(Self::Monitor, ScreenRect)>;
    fn current_monitor(&self) -> Option<Self::Monitor>;
    fn enter_fullscreen(&self, monitor: Option<Self::Monitor>);
    fn leave_fullscreen(&self, position: (i32, i32), size: (u32, u32));
}

impl DisplayTarget for Window {
    type Monitor = MonitorHandle;

    fn outer_rect(&self) -> ScreenRect {
        let position = self.outer_position().unwrap_or_default();
        let size = self.outer_size();
        ScreenRect::new(position.x, position.y, size.width, size.height)
    }

    fn monitors(&self) -> Vec<(MonitorHandle, ScreenRect)> {
        self.available_monitors()
            .map(|monitor| {
                let position = monitor.position();
                let size = monitor.size();
                let rect = ScreenRect::new(position.x, position.y, size.width, size.height);
                (monitor, rect)
            })
            .collect()
    }

    fn current_monitor(&self) -> Option<MonitorHandle> {
        Window::current_monitor(self)
    }

    fn enter_fullscreen(&self, monitor: Option<MonitorHandle>) {
        self.set_fullscreen(Some(Fullscreen::Borderless(monitor)));
    }

    fn leave_fullscreen(&self, (x, y): (i32, i32), (width, height): (u32, u32)) {
        self.set_fullscreen(None);
        self.set_outer_position(PhysicalPosition::new(x, y));
        // Platforms that resize asynchronously report the new size through `Resized`.
        let _ = self.request_inner_size(PhysicalSize::new(width, height));
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayState {
    fullscreen: bool,
    windowed_size: (u32, u32),
}

impl DisplayState {
    /// `windowed_size` is restored whenever fullscreen is left.
    pub fn new(windowed_size: (u32, u32)) -> Self {
        DisplayState {
            fullscreen: false,
            windowed_size,
        }
    }

    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    pub fn toggle_fullscreen<T: DisplayTarget + ?Sized>(&mut self, target: &T) {
        if self.fullscreen {
            info!("leaving fullscreen");
            target.leave_fullscreen(WINDOWED_POSITION, self.windowed_size);
        } else {
            let window = target.outer_rect();
            let monitors = target.monitors();
            let rects: Vec<ScreenRect> = monitors.iter().map(|(_, rect)| *rect).collect();
            let monitor = match best_overlap(&window, &rects) {
                Some(index) => {
                    debug!("window {:?} overlaps monitor {:?} the most", window, rects[index]);
                    Some(monitors[index].0.clone())
                }
                None => target.current_monitor(),
            };
            info!("entering fullscreen");
            target.enter_fullscreen(monitor);
        }
        self.fullscreen = !self.fullscreen;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn overlap_is_clamped_product() {
        let window = ScreenRect::new(100, 100, 800, 600);
        assert_eq!(window.overlap_area(&window), 800 * 600);
        assert_eq!(window.overlap_area(&ScreenRect::new(500, 400, 1000, 1000)), 400 * 300);
        assert_eq!(window.overlap_area(&ScreenRect::new(2000, 0, 100, 100)), 0);
        // Touching edges share no area.
        assert_eq!(window.overlap_area(&ScreenRect::new(900, 100, 100, 100)), 0);
        assert_eq!(window.overlap_area(&ScreenRect::new(-1000, -1000, 1200, 1200)), 100 * 100);
    }

    #[test]
    fn picks_the_monitor_with_the_larger_overlap() {
        let monitors = [
            ScreenRect::new(0, 0, 1920, 1080),
            ScreenRect::new(1920, 0, 2560, 1440),
        ];
        // 420 px on the left monitor, 380 px on the right one.
        let window = ScreenRect::new(1500, 200, 800, 600);
        assert_eq!(best_overlap(&window, &monitors), Some(0));

        let window = ScreenRect::new(1600, 200, 800, 600);
        assert_eq!(best_overlap(&window, &monitors), Some(1));
    }

    #[test]
    fn ties_keep_the_first_monitor() {
        let monitors = [
            ScreenRect::new(0, 0, 1000, 1000),
            ScreenRect::new(1000, 0, 1000, 1000),
        ];
        let window = ScreenRect::new(900, 0, 200, 100);
        assert_eq!(best_overlap(&window, &monitors), Some(0));
    }

    #[test]
    fn no_overlap_selects_nothing() {
        let monitors = [ScreenRect::new(0, 0, 100, 100)];
        assert_eq!(best_overlap(&ScreenRect::new(500, 500, 10, 10), &monitors), None);
        assert_eq!(best_overlap(&ScreenRect::new(0, 0, 10, 10), &[]), None);
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Enter(Option<&'static str>),
        Leave((i32, i32), (u32, u32)),
    }

    struct FakeWindow {
        rect: ScreenRect,
        monitors: Vec<(&'static str, ScreenRect)>,
        calls: RefCell<Vec<Call>>,
    }

    impl DisplayTarget for FakeWindow {
        type Monitor = &'static str;

        fn outer_rect(&self) -> ScreenRect {
            self.rect
        }

        fn monitors(&self) -> Vec<(&'static str, ScreenRect)> {
            self.monitors.clone()
        }

        fn current_monitor(&self) -> Option<&'static str> {
            Some("current")
        }

        fn enter_fullscreen(&self, monitor: Option<&'static str>) {
            self.calls.borrow_mut().push(Call::Enter(monitor));
        }

        fn leave_fullscreen(&self, position: (i32, i32), size: (u32, u32)) {
            self.calls.borrow_mut().push(Call::Leave(position, size));
        }
    }

    #[test]
    fn toggle_enters_best_monitor_then_restores_window() {
        let window = FakeWindow {
            rect: ScreenRect::new(1700, 100, 640, 480),
            monitors: vec![
                ("left", ScreenRect::new(0, 0, 1920, 1080)),
                ("right", ScreenRect::new(1920, 0, 1920, 1080)),
            ],
            calls: RefCell::new(Vec::new()),
        };
        let mut display = DisplayState::new((1280, 720));

        display.toggle_fullscreen(&window);
        assert!(display.is_fullscreen());
        display.toggle_fullscreen(&window);
        assert!(!display.is_fullscreen());

        assert_eq!(
            window.calls.into_inner(),
            [
                Call::Enter(Some("right")),
                Call::Leave(WINDOWED_POSITION, (1280, 720)),
            ]
        );
    }

    #[test]
    fn off_screen_window_falls_back_to_current_monitor() {
        let window = FakeWindow {
            rect: ScreenRect::new(-5000, -5000, 640, 480),
            monitors: vec![("only", ScreenRect::new(0, 0, 1920, 1080))],
            calls: RefCell::new(Vec::new()),
        };
        let mut display = DisplayState::new((640, 480));
        display.toggle_fullscreen(&window);
        assert_eq!(window.calls.into_inner(), [Call::Enter(Some("current"))]);
    }
}
