//! A live binding of one renderer to one display surface, and the local
//! tasks that keep it refreshed.

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use iklayout_renderer::LayoutRenderer;

use crate::adapter::{LayoutSource, Raster, RendererAdapter};
use crate::cells::{all_cells, resolve_selection, CellInfo};
use crate::config::{validate_dimensions, ViewerConfig};
use crate::display::DisplaySurface;
use crate::error::ViewerError;
use crate::event::{ChromeButton, PointerEvent, ScrollDirection, SurfaceEvent};
use crate::overlay::{InfoBox, OverlayHandle};
use crate::throttle::RateLimiter;
use crate::translate::{Dispatch, DoubleClickPolicy};

pub struct ViewSession<R, S> {
    adapter: RendererAdapter<R>,
    surface: S,
    config: ViewerConfig,
    double_click: DoubleClickPolicy,
    scroll_limiter: Option<RateLimiter>,
    raster: Option<Raster>,
    info: Option<OverlayHandle>,
    repaint: Rc<Notify>,
}

fn zoom<R: LayoutRenderer>(adapter: &mut RendererAdapter<R>, direction: ScrollDirection) {
    match direction {
        ScrollDirection::Up => adapter.zoom_in(),
        ScrollDirection::Down => adapter.zoom_out(),
    }
}

impl<R: LayoutRenderer, S: DisplaySurface> ViewSession<R, S> {
    /// Load `source` into `renderer`, size both sides to the configured
    /// canvas and present the first frame.
    pub fn open(
        renderer: R,
        mut surface: S,
        source: impl Into<LayoutSource>,
        config: ViewerConfig,
    ) -> Result<Self, ViewerError> {
        config.validate()?;
        let (width, height) = (config.width, config.height);
        surface.set_dimensions(width, height);

        let mut adapter = RendererAdapter::new(renderer, width, height);
        adapter.load(&source.into(), &config.transfer_dir())?;
        adapter.resize(width, height);
        adapter.prepare_view();

        let repaint = Rc::new(Notify::new());
        let notify = Rc::clone(&repaint);
        adapter.on_image_updated(Box::new(move || notify.notify_one()));

        let double_click = config.double_click.unwrap_or(surface.double_click_policy());
        let scroll_limiter = surface
            .throttles_scroll()
            .then(|| RateLimiter::new(config.scroll_throttle()));

        let mut session = Self {
            adapter,
            surface,
            config,
            double_click,
            scroll_limiter,
            raster: None,
            info: None,
            repaint,
        };
        session.refresh()?;
        log::info!("View session opened at {}x{}", width, height);
        Ok(session)
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn renderer(&self) -> &R {
        self.adapter.renderer()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.adapter.dimensions()
    }

    /// Last frame pushed to the surface.
    pub fn raster(&self) -> Option<&Raster> {
        self.raster.as_ref()
    }

    pub fn info_overlay(&self) -> Option<OverlayHandle> {
        self.info
    }

    /// Pull the renderer's frame and present it.
    pub fn refresh(&mut self) -> Result<(), ViewerError> {
        let raster = self.adapter.capture_raster()?;
        self.surface.present(&raster)?;
        self.raster = Some(raster);
        Ok(())
    }

    /// Advance the renderer timer once.
    pub fn tick(&mut self) {
        self.adapter.tick();
    }

    /// Resize renderer and surface together. The renderer reports the
    /// change, so the resized frame arrives through the repaint trigger.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), ViewerError> {
        validate_dimensions(width, height)?;
        self.adapter.resize(width, height);
        self.surface.set_dimensions(width, height);
        Ok(())
    }

    pub fn capture_raster(&self) -> Result<Raster, ViewerError> {
        self.adapter.capture_raster()
    }

    pub fn zoom_in(&mut self) {
        self.adapter.zoom_in();
    }

    pub fn zoom_out(&mut self) {
        self.adapter.zoom_out();
    }

    pub fn reset_zoom(&mut self) {
        self.adapter.reset_zoom();
    }

    /// Apply one surface event. Visual changes are painted later, when the
    /// renderer reports them.
    pub fn handle_event(&mut self, event: SurfaceEvent) {
        match event {
            SurfaceEvent::Button(ChromeButton::ZoomIn) => self.zoom_in(),
            SurfaceEvent::Button(ChromeButton::ZoomOut) => self.zoom_out(),
            SurfaceEvent::Button(ChromeButton::Reset) => self.reset_zoom(),
            SurfaceEvent::Pointer(pointer) => self.handle_pointer(&pointer),
        }
    }

    fn handle_pointer(&mut self, event: &PointerEvent) {
        match self.adapter.forward_event(event, self.double_click) {
            Dispatch::Zoom(direction) => match self.scroll_limiter.as_mut() {
                Some(limiter) => {
                    let adapter = &mut self.adapter;
                    if limiter.call(|| zoom(adapter, direction)).is_none() {
                        log::debug!("Scroll {:?} dropped by throttle", direction);
                    }
                }
                None => zoom(&mut self.adapter, direction),
            },
            Dispatch::Dropped => log::debug!("Dropped {:?}", event),
            Dispatch::Forwarded => {
                if event.is_release() && self.surface.supports_overlay() {
                    self.update_info();
                }
            }
        }
    }

    /// Every cell of the loaded hierarchy, freshly flattened.
    pub fn all_cells(&self) -> Vec<CellInfo> {
        all_cells(self.adapter.renderer())
    }

    /// Cells owning the current selection, per the configured policy.
    pub fn selected_cells(&self) -> Vec<CellInfo> {
        resolve_selection(self.adapter.renderer(), self.config.selection)
    }

    /// Replace the info box with one for the selected cell. Leaves the
    /// current box in place when nothing is selected.
    pub fn update_info(&mut self) -> Option<CellInfo> {
        let selected = self.selected_cells();
        let cell = selected.first()?.clone();
        if selected.len() > 1 {
            let names: Vec<&str> = selected.iter().map(|c| c.name.as_str()).collect();
            log::info!("Selected cells: {}", names.join(", "));
        } else {
            log::info!("Selected cell '{}' (id {})", cell.name, cell.id);
        }

        if let Some(previous) = self.info.take() {
            self.surface.remove_overlay(previous);
        }
        self.info = self
            .surface
            .draw_overlay(InfoBox::for_cell(&cell, self.config.info_anchor));
        Some(cell)
    }
}

impl<R, S> ViewSession<R, S>
where
    R: LayoutRenderer + 'static,
    S: DisplaySurface + 'static,
{
    /// Spawn the tick driver, repaint trigger and event pump on the current
    /// `LocalSet`. Panics outside a `LocalSet`.
    pub fn start(mut self) -> Result<SessionHandle<R, S>, ViewerError> {
        let events = self.surface.subscribe().ok_or(ViewerError::AlreadySubscribed)?;
        let period = self.config.tick_interval();
        let repaint = Rc::clone(&self.repaint);
        let session = Rc::new(RefCell::new(self));

        let ticker = tokio::task::spawn_local(drive_ticks(Rc::downgrade(&session), period));
        let repainter =
            tokio::task::spawn_local(drive_repaints(Rc::downgrade(&session), repaint));
        let pump = tokio::task::spawn_local(pump_events(Rc::downgrade(&session), events));
        log::debug!("Session tasks started, tick every {:?}", period);

        Ok(SessionHandle {
            session,
            ticker,
            repainter,
            pump,
        })
    }
}

async fn drive_ticks<R: LayoutRenderer, S: DisplaySurface>(
    session: Weak<RefCell<ViewSession<R, S>>>,
    period: Duration,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        let Some(live) = session.upgrade() else {
            break;
        };
        live.borrow_mut().tick();
    }
}

async fn drive_repaints<R: LayoutRenderer, S: DisplaySurface>(
    session: Weak<RefCell<ViewSession<R, S>>>,
    repaint: Rc<Notify>,
) -> Result<(), ViewerError> {
    loop {
        repaint.notified().await;
        let Some(live) = session.upgrade() else {
            break;
        };
        let result = live.borrow_mut().refresh();
        result?;
    }
    Ok(())
}

async fn pump_events<R: LayoutRenderer, S: DisplaySurface>(
    session: Weak<RefCell<ViewSession<R, S>>>,
    mut events: UnboundedReceiver<SurfaceEvent>,
) {
    while let Some(event) = events.recv().await {
        let Some(live) = session.upgrade() else {
            break;
        };
        live.borrow_mut().handle_event(event);
    }
}

/// Running session. Dropping it stops the tasks.
pub struct SessionHandle<R, S> {
    session: Rc<RefCell<ViewSession<R, S>>>,
    ticker: JoinHandle<()>,
    repainter: JoinHandle<Result<(), ViewerError>>,
    pump: JoinHandle<()>,
}

impl<R, S> SessionHandle<R, S> {
    pub fn session(&self) -> Rc<RefCell<ViewSession<R, S>>> {
        Rc::clone(&self.session)
    }

    pub fn shutdown(self) {
        drop(self);
    }

    /// Wait until the repaint trigger stops, returning its error. The
    /// remaining tasks are stopped.
    pub async fn wait(mut self) -> Result<(), ViewerError> {
        match (&mut self.repainter).await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Ok(()),
            Err(e) => std::panic::resume_unwind(e.into_panic()),
        }
    }
}

impl<R, S> Drop for SessionHandle<R, S> {
    fn drop(&mut self) {
        self.ticker.abort();
        self.repainter.abort();
        self.pump.abort();
        log::debug!("Session tasks stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;
    use crate::display::{CanvasEvent, ChromeCanvas, FigureCanvas};
    use crate::event::MouseButton;
    use crate::test_support::{Call, FakeRenderer};
    use iklayout_core::geometry::{GeomPrimitive, Rect};
    use iklayout_core::{Cell, LayoutDatabase};
    use iklayout_renderer::LayoutView;
    use tokio::task::LocalSet;

    fn config(dir: &std::path::Path) -> ViewerConfig {
        ViewerConfig {
            width: 100,
            height: 100,
            transfer_dir: Some(dir.to_path_buf()),
            ..Default::default()
        }
    }

    fn single_top() -> LayoutDatabase {
        let mut db = LayoutDatabase::new("single");
        let mut top = Cell::new("TOP");
        top.add_geometry(GeomPrimitive::Rect(Rect::new(1, 0.0, 0.0, 10.0, 10.0)));
        db.add_cell(top).unwrap();
        db
    }

    fn fake_session<S: DisplaySurface>(
        renderer: FakeRenderer,
        surface: S,
    ) -> ViewSession<FakeRenderer, S> {
        let dir = std::env::temp_dir();
        ViewSession::open(renderer, surface, dir.join("fake.gds"), config(&dir)).unwrap()
    }

    #[test]
    fn test_open_sets_up_in_order() {
        let renderer = FakeRenderer::new();
        let log = renderer.log();
        let session = fake_session(renderer, FigureCanvas::new(1, 1));

        let calls = log.borrow().clone();
        assert!(matches!(calls[0], Call::Load(_)));
        assert_eq!(
            calls[1..],
            [Call::Resize(100, 100), Call::ZoomFit, Call::MaxHier, Call::AddMissingLayers]
        );
        assert_eq!(session.surface().dimensions(), (100, 100));
        assert_eq!(session.surface().frames(), 1);
    }

    #[test]
    fn test_load_failure_surfaces() {
        let dir = tempfile::tempdir().unwrap();
        let result = ViewSession::open(
            FakeRenderer::new().with_failing_load(),
            FigureCanvas::new(1, 1),
            dir.path().join("x.gds"),
            config(dir.path()),
        );
        assert!(matches!(result, Err(ViewerError::Load(_))));
    }

    #[test]
    fn test_single_top_cell_listing() {
        let dir = tempfile::tempdir().unwrap();
        let session = ViewSession::open(
            LayoutView::new(),
            FigureCanvas::new(1, 1),
            single_top(),
            config(dir.path()),
        )
        .unwrap();

        let cells = session.all_cells();
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].name, "TOP");
        assert!(cells[0].is_top);
        assert_eq!(cells[0].id, 0);
        assert_eq!(cells[0].bbox.unwrap().to_array(), [0.0, 0.0, 10.0, 10.0]);
    }

    #[test]
    fn test_click_on_empty_space_draws_no_overlay() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = ViewSession::open(
            LayoutView::new(),
            ChromeCanvas::new(1, 1),
            single_top(),
            config(dir.path()),
        )
        .unwrap();

        session.handle_event(PointerEvent::press(2.0, 98.0).into());
        session.handle_event(PointerEvent::release(2.0, 98.0).into());
        assert!(session.info_overlay().is_none());
        assert_eq!(session.surface().overlays().count(), 0);
    }

    #[test]
    fn test_click_on_shape_replaces_info_box() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = ViewSession::open(
            LayoutView::new(),
            ChromeCanvas::new(1, 1),
            single_top(),
            config(dir.path()),
        )
        .unwrap();

        for _ in 0..2 {
            session.handle_event(PointerEvent::press(50.0, 50.0).into());
            session.handle_event(PointerEvent::release(50.0, 50.0).into());
        }
        let labels: Vec<String> = session.surface().overlays().map(|o| o.lines[0].clone()).collect();
        assert_eq!(labels, vec!["TOP"]);

        // Nothing selected: the previous box stays.
        session.handle_event(PointerEvent::press(2.0, 98.0).into());
        session.handle_event(PointerEvent::release(2.0, 98.0).into());
        assert_eq!(session.surface().overlays().count(), 1);
    }

    #[test]
    fn test_resize_then_capture_uses_latest_size() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = ViewSession::open(
            LayoutView::new(),
            FigureCanvas::new(1, 1),
            single_top(),
            config(dir.path()),
        )
        .unwrap();

        session.resize(800, 600).unwrap();
        session.resize(400, 300).unwrap();
        let raster = session.capture_raster().unwrap();
        assert_eq!(raster.dimensions(), (400, 300));
        assert_eq!(session.surface().dimensions(), (400, 300));
        // Painting waits for the renderer's change report.
        assert_eq!(session.surface().frames(), 1);
        assert_eq!(session.surface().image().unwrap().dimensions(), (100, 100));
    }

    #[test]
    fn test_resize_rejects_empty_canvas() {
        let renderer = FakeRenderer::new();
        let log = renderer.log();
        let mut session = fake_session(renderer, FigureCanvas::new(1, 1));
        log.borrow_mut().clear();

        for (w, h) in [(0, 300), (400, 0)] {
            assert!(matches!(
                session.resize(w, h),
                Err(ViewerError::Config(ConfigError::Invalid { field: "width/height", .. }))
            ));
        }
        assert!(log.borrow().is_empty());
        assert_eq!(session.dimensions(), (100, 100));
        assert_eq!(session.surface().dimensions(), (100, 100));
    }

    #[test]
    fn test_scroll_throttled_only_on_chrome() {
        let renderer = FakeRenderer::new();
        let log = renderer.log();
        let mut chrome = fake_session(renderer, ChromeCanvas::new(1, 1));
        log.borrow_mut().clear();
        for _ in 0..5 {
            chrome.handle_event(PointerEvent::scroll(ScrollDirection::Up).into());
        }
        assert_eq!(*log.borrow(), vec![Call::ZoomIn]);

        let renderer = FakeRenderer::new();
        let log = renderer.log();
        let mut figure = fake_session(renderer, FigureCanvas::new(1, 1));
        log.borrow_mut().clear();
        for _ in 0..5 {
            figure.handle_event(PointerEvent::scroll(ScrollDirection::Down).into());
        }
        assert_eq!(*log.borrow(), vec![Call::ZoomOut; 5]);
    }

    #[test]
    fn test_chrome_buttons_drive_zoom() {
        let renderer = FakeRenderer::new();
        let log = renderer.log();
        let mut session = fake_session(renderer, ChromeCanvas::new(1, 1));
        log.borrow_mut().clear();
        for button in [ChromeButton::ZoomIn, ChromeButton::ZoomOut, ChromeButton::Reset] {
            session.handle_event(SurfaceEvent::Button(button));
        }
        assert_eq!(*log.borrow(), vec![Call::ZoomIn, Call::ZoomOut, Call::ZoomFit]);
    }

    #[test]
    fn test_config_overrides_surface_double_click() {
        let dir = std::env::temp_dir();
        let renderer = FakeRenderer::new();
        let log = renderer.log();
        let config = ViewerConfig {
            double_click: Some(DoubleClickPolicy::Drop),
            ..config(&dir)
        };
        let mut session =
            ViewSession::open(renderer, FigureCanvas::new(1, 1), dir.join("fake.gds"), config)
                .unwrap();
        log.borrow_mut().clear();
        session.handle_event(PointerEvent::double_click(1.0, 1.0).into());
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_second_start_rejected() {
        let mut session = fake_session(FakeRenderer::new(), FigureCanvas::new(1, 1));
        let _rx = session.surface_mut().subscribe();
        assert!(matches!(session.start(), Err(ViewerError::AlreadySubscribed)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_repaints_only_after_change() {
        LocalSet::new()
            .run_until(async {
                let renderer = FakeRenderer::new();
                let ticks = renderer.ticks();
                let surface = FigureCanvas::new(1, 1);
                let host = surface.connect();
                let handle = fake_session(renderer, surface).start().unwrap();
                let session = handle.session();

                // Setup changes are painted by the first tick, then nothing.
                tokio::time::sleep(Duration::from_millis(55)).await;
                assert!(ticks.get() >= 5);
                assert_eq!(session.borrow().surface().frames(), 2);

                host.emit(CanvasEvent::MotionNotify {
                    xdata: Some(3.0),
                    ydata: Some(4.0),
                    button: Some(MouseButton::Left),
                })
                .unwrap();
                tokio::time::sleep(Duration::from_millis(25)).await;
                assert_eq!(session.borrow().surface().frames(), 3);

                handle.shutdown();
                let before = ticks.get();
                tokio::time::sleep(Duration::from_millis(50)).await;
                assert_eq!(ticks.get(), before);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_resize_repaints_once_on_next_tick() {
        LocalSet::new()
            .run_until(async {
                let dir = tempfile::tempdir().unwrap();
                let session = ViewSession::open(
                    LayoutView::new(),
                    FigureCanvas::new(1, 1),
                    single_top(),
                    config(dir.path()),
                )
                .unwrap();
                let handle = session.start().unwrap();
                let session = handle.session();

                tokio::time::sleep(Duration::from_millis(30)).await;
                let before = session.borrow().surface().frames();

                session.borrow_mut().resize(400, 300).unwrap();
                assert_eq!(session.borrow().surface().frames(), before);

                tokio::time::sleep(Duration::from_millis(50)).await;
                let live = session.borrow();
                assert_eq!(live.surface().frames(), before + 1);
                assert_eq!(live.surface().image().unwrap().dimensions(), (400, 300));
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_hover_after_drag_released_over_button_does_not_pan() {
        LocalSet::new()
            .run_until(async {
                let dir = tempfile::tempdir().unwrap();
                let surface = ChromeCanvas::new(1, 1);
                let host = surface.connect();
                let session = ViewSession::open(
                    LayoutView::new(),
                    surface,
                    single_top(),
                    config(dir.path()),
                )
                .unwrap();
                let handle = session.start().unwrap();
                let session = handle.session();
                let center = || {
                    let live = session.borrow();
                    let viewport = live.renderer().viewport();
                    (viewport.center_x, viewport.center_y)
                };

                host.emit(CanvasEvent::ButtonPress {
                    xdata: Some(30.0),
                    ydata: Some(50.0),
                    button: MouseButton::Left,
                    dblclick: false,
                })
                .unwrap();
                host.emit(CanvasEvent::MotionNotify {
                    xdata: Some(50.0),
                    ydata: Some(50.0),
                    button: Some(MouseButton::Left),
                })
                .unwrap();
                // Drag ends over the zoom-in button.
                host.emit(CanvasEvent::ButtonRelease {
                    xdata: Some(80.0),
                    ydata: Some(20.0),
                    button: MouseButton::Left,
                })
                .unwrap();
                tokio::time::sleep(Duration::from_millis(20)).await;
                let dragged = center();

                host.emit(CanvasEvent::MotionNotify {
                    xdata: Some(10.0),
                    ydata: Some(90.0),
                    button: None,
                })
                .unwrap();
                tokio::time::sleep(Duration::from_millis(20)).await;
                assert_eq!(center(), dragged);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_decode_error_ends_session() {
        LocalSet::new()
            .run_until(async {
                let renderer = FakeRenderer::new();
                let corrupt = renderer.corruption();
                let surface = FigureCanvas::new(1, 1);
                let host = surface.connect();
                let handle = fake_session(renderer, surface).start().unwrap();

                tokio::time::sleep(Duration::from_millis(20)).await;
                corrupt.set(true);
                host.emit(CanvasEvent::FigureEnter).unwrap();

                let result = handle.wait().await;
                assert!(matches!(result, Err(ViewerError::Decode(_))));
            })
            .await;
    }
}
