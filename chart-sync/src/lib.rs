//! Keeps a set of graphs zoomed to the same x-range.
//!
//! Graph handles redraw synchronously when their window changes, and every
//! redraw reports back through [`SyncGroup::on_draw`]. A propagation in flight
//! therefore sees its own echo from each sibling; the redraw guard swallows
//! those echoes so a zoom is applied exactly once per sibling.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use dist_core::VisibleRange;
use log::{debug, trace, warn};

pub type ChartId = usize;

/// A graph whose x-axis window can be read and set by the host.
pub trait LinkedChart {
    fn x_range(&self) -> (f64, f64);
    fn set_date_window(&self, range: (f64, f64));
    fn set_roll_period(&self, period: u32);
}

/// Anything that redraws when the shared x-range changes, e.g. the heat strips.
pub trait RangeListener {
    fn on_range(&self, from: f64, to: f64);
    /// Zoom was reset; go back to whatever range is shown before any zoom.
    fn on_reset(&self);
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// First draw of a chart; its range was stored for zoom reset.
    Recorded(VisibleRange),
    /// A propagation is already running.
    Reentrant,
    UnknownChart,
    /// The chart reported an empty or non-finite range.
    InvalidRange,
    Propagated { range: VisibleRange, siblings: usize },
}

/// Holds the redraw flag for the lifetime of one propagation.
struct RedrawGuard<'a> {
    flag: &'a Cell<bool>,
}

impl<'a> RedrawGuard<'a> {
    fn acquire(flag: &'a Cell<bool>) -> Option<Self> {
        if flag.replace(true) {
            None
        } else {
            Some(Self { flag })
        }
    }
}

impl Drop for RedrawGuard<'_> {
    fn drop(&mut self) {
        self.flag.set(false);
    }
}

struct Member {
    chart: Rc<dyn LinkedChart>,
    original: Option<VisibleRange>,
}

#[derive(Default)]
pub struct SyncGroup {
    members: RefCell<Vec<Member>>,
    listeners: RefCell<Vec<Rc<dyn RangeListener>>>,
    redrawing: Cell<bool>,
}

impl SyncGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_chart(&self, chart: Rc<dyn LinkedChart>) -> ChartId {
        let mut members = self.members.borrow_mut();
        members.push(Member {
            chart,
            original: None,
        });
        members.len() - 1
    }

    pub fn add_listener(&self, listener: Rc<dyn RangeListener>) {
        self.listeners.borrow_mut().push(listener);
    }

    pub fn len(&self) -> usize {
        self.members.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.borrow().is_empty()
    }

    pub fn is_redrawing(&self) -> bool {
        self.redrawing.get()
    }

    /// Forget every chart and listener. Callbacks still holding old ids get
    /// [`SyncOutcome::UnknownChart`].
    pub fn clear(&self) {
        let charts = std::mem::take(&mut *self.members.borrow_mut()).len();
        self.listeners.borrow_mut().clear();
        self.redrawing.set(false);
        debug!("sync: cleared {charts} charts");
    }

    /// Range a chart showed on its first draw.
    pub fn original_range(&self, id: ChartId) -> Option<VisibleRange> {
        self.members.borrow().get(id).and_then(|m| m.original)
    }

    /// Draw callback of chart `id`. Pushes its window to every sibling and listener.
    pub fn on_draw(&self, id: ChartId, initial: bool) -> SyncOutcome {
        let Some(chart) = self.chart(id) else {
            return SyncOutcome::UnknownChart;
        };

        if initial {
            let (from, to) = chart.x_range();
            return match VisibleRange::new(from, to) {
                Some(range) => {
                    if let Some(m) = self.members.borrow_mut().get_mut(id) {
                        m.original = Some(range);
                    }
                    trace!("sync: chart {id} initial range [{from}, {to}]");
                    SyncOutcome::Recorded(range)
                }
                None => SyncOutcome::InvalidRange,
            };
        }

        let Some(_guard) = RedrawGuard::acquire(&self.redrawing) else {
            trace!("sync: chart {id} redraw during propagation ignored");
            return SyncOutcome::Reentrant;
        };

        let (from, to) = chart.x_range();
        let Some(range) = VisibleRange::new(from, to) else {
            warn!("sync: chart {id} reported unusable range [{from}, {to}]");
            return SyncOutcome::InvalidRange;
        };

        self.notify(range);
        let siblings: Vec<Rc<dyn LinkedChart>> = self
            .members
            .borrow()
            .iter()
            .enumerate()
            .filter(|(other, _)| *other != id)
            .map(|(_, m)| m.chart.clone())
            .collect();
        for sibling in &siblings {
            sibling.set_date_window((range.from, range.to));
        }
        debug!(
            "sync: chart {id} -> [{}, {}] on {} siblings",
            range.from,
            range.to,
            siblings.len()
        );
        SyncOutcome::Propagated {
            range,
            siblings: siblings.len(),
        }
    }

    /// Apply a rolling-average period to every chart.
    pub fn set_roll_period(&self, period: u32) {
        let _guard = RedrawGuard::acquire(&self.redrawing);
        for chart in self.charts() {
            chart.set_roll_period(period);
        }
    }

    /// Zoom every chart back to the range it first showed and reset listeners.
    /// Returns the union of those ranges.
    pub fn reset_zoom(&self) -> Option<VisibleRange> {
        let _guard = RedrawGuard::acquire(&self.redrawing)?;
        let targets: Vec<(Rc<dyn LinkedChart>, VisibleRange)> = self
            .members
            .borrow()
            .iter()
            .filter_map(|m| m.original.map(|r| (m.chart.clone(), r)))
            .collect();
        let mut union: Option<VisibleRange> = None;
        for (chart, range) in &targets {
            chart.set_date_window((range.from, range.to));
            union = Some(match union {
                Some(u) => u.union(range),
                None => *range,
            });
        }
        let listeners: Vec<Rc<dyn RangeListener>> = self.listeners.borrow().clone();
        for listener in listeners {
            listener.on_reset();
        }
        union
    }

    fn notify(&self, range: VisibleRange) {
        let listeners: Vec<Rc<dyn RangeListener>> = self.listeners.borrow().clone();
        for listener in listeners {
            listener.on_range(range.from, range.to);
        }
    }

    fn chart(&self, id: ChartId) -> Option<Rc<dyn LinkedChart>> {
        self.members.borrow().get(id).map(|m| m.chart.clone())
    }

    fn charts(&self) -> Vec<Rc<dyn LinkedChart>> {
        self.members.borrow().iter().map(|m| m.chart.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Weak;

    /// Behaves like a graph widget: setting the window redraws and calls back.
    struct EchoChart {
        id: Cell<ChartId>,
        range: Cell<(f64, f64)>,
        windows: RefCell<Vec<(f64, f64)>>,
        roll: Cell<u32>,
        group: RefCell<Weak<SyncGroup>>,
    }

    impl EchoChart {
        fn new(range: (f64, f64)) -> Rc<Self> {
            Rc::new(Self {
                id: Cell::new(0),
                range: Cell::new(range),
                windows: RefCell::new(Vec::new()),
                roll: Cell::new(1),
                group: RefCell::new(Weak::new()),
            })
        }

        fn attach(self: &Rc<Self>, group: &Rc<SyncGroup>) {
            *self.group.borrow_mut() = Rc::downgrade(group);
            let id = group.add_chart(self.clone());
            self.id.set(id);
            group.on_draw(id, true);
        }

        fn redraw(&self) -> Option<SyncOutcome> {
            let group = self.group.borrow().upgrade()?;
            Some(group.on_draw(self.id.get(), false))
        }
    }

    impl LinkedChart for EchoChart {
        fn x_range(&self) -> (f64, f64) {
            self.range.get()
        }

        fn set_date_window(&self, range: (f64, f64)) {
            self.range.set(range);
            self.windows.borrow_mut().push(range);
            let echo = self.redraw();
            assert_eq!(echo, Some(SyncOutcome::Reentrant));
        }

        fn set_roll_period(&self, period: u32) {
            self.roll.set(period);
            self.redraw();
        }
    }

    #[derive(Default)]
    struct Recorder {
        ranges: RefCell<Vec<(f64, f64)>>,
        resets: Cell<usize>,
    }

    impl RangeListener for Recorder {
        fn on_range(&self, from: f64, to: f64) {
            self.ranges.borrow_mut().push((from, to));
        }

        fn on_reset(&self) {
            self.resets.set(self.resets.get() + 1);
        }
    }

    fn group_of(ranges: &[(f64, f64)]) -> (Rc<SyncGroup>, Vec<Rc<EchoChart>>) {
        let group = Rc::new(SyncGroup::new());
        let charts: Vec<Rc<EchoChart>> = ranges.iter().map(|r| EchoChart::new(*r)).collect();
        for c in &charts {
            c.attach(&group);
        }
        (group, charts)
    }

    #[test]
    fn initial_draw_records_original_range() {
        let (group, _charts) = group_of(&[(0.0, 100.0), (0.0, 80.0)]);
        assert_eq!(group.len(), 2);
        assert_eq!(group.original_range(1), VisibleRange::new(0.0, 80.0));
        assert_eq!(group.original_range(5), None);
    }

    #[test]
    fn zoom_reaches_siblings_once_and_not_originator() {
        let (group, charts) = group_of(&[(0.0, 100.0), (0.0, 100.0), (0.0, 100.0)]);
        let recorder = Rc::new(Recorder::default());
        group.add_listener(recorder.clone());

        charts[0].range.set((20.0, 40.0));
        let outcome = charts[0].redraw().unwrap();

        assert_eq!(
            outcome,
            SyncOutcome::Propagated {
                range: VisibleRange::new(20.0, 40.0).unwrap(),
                siblings: 2,
            }
        );
        assert!(charts[0].windows.borrow().is_empty());
        assert_eq!(*charts[1].windows.borrow(), vec![(20.0, 40.0)]);
        assert_eq!(*charts[2].windows.borrow(), vec![(20.0, 40.0)]);
        assert_eq!(*recorder.ranges.borrow(), vec![(20.0, 40.0)]);
        assert!(!group.is_redrawing());
    }

    #[test]
    fn invalid_range_releases_guard() {
        let (group, charts) = group_of(&[(0.0, 100.0), (0.0, 100.0)]);
        charts[0].range.set((5.0, 5.0));
        assert_eq!(charts[0].redraw(), Some(SyncOutcome::InvalidRange));
        assert!(!group.is_redrawing());
        assert!(charts[1].windows.borrow().is_empty());
    }

    #[test]
    fn unknown_chart_is_reported() {
        let group = SyncGroup::new();
        assert_eq!(group.on_draw(3, false), SyncOutcome::UnknownChart);
    }

    #[test]
    fn roll_period_applies_to_all() {
        let (group, charts) = group_of(&[(0.0, 10.0), (0.0, 10.0)]);
        group.set_roll_period(7);
        assert!(charts.iter().all(|c| c.roll.get() == 7));
        assert!(!group.is_redrawing());
    }

    #[test]
    fn reset_zoom_restores_originals() {
        let (group, charts) = group_of(&[(0.0, 100.0), (10.0, 120.0)]);
        let recorder = Rc::new(Recorder::default());
        group.add_listener(recorder.clone());

        charts[0].range.set((30.0, 40.0));
        charts[0].redraw();
        let union = group.reset_zoom().unwrap();

        assert_eq!((union.from, union.to), (0.0, 120.0));
        assert_eq!(charts[0].range.get(), (0.0, 100.0));
        assert_eq!(charts[1].range.get(), (10.0, 120.0));
        // Listeners fall back to their own defaults, not the union.
        assert_eq!(*recorder.ranges.borrow(), vec![(30.0, 40.0)]);
        assert_eq!(recorder.resets.get(), 1);
    }

    #[test]
    fn cleared_group_keeps_no_charts() {
        let (group, stale) = group_of(&[(0.0, 100.0), (0.0, 50.0)]);
        let old_listener = Rc::new(Recorder::default());
        group.add_listener(old_listener.clone());

        group.clear();
        assert!(group.is_empty());
        assert_eq!(group.original_range(0), None);
        assert_eq!(stale[0].redraw(), Some(SyncOutcome::UnknownChart));

        let fresh = EchoChart::new((0.0, 10.0));
        fresh.attach(&group);
        let other = EchoChart::new((0.0, 10.0));
        other.attach(&group);
        assert_eq!((fresh.id.get(), other.id.get()), (0, 1));

        fresh.range.set((2.0, 4.0));
        let outcome = fresh.redraw().unwrap();
        assert_eq!(
            outcome,
            SyncOutcome::Propagated {
                range: VisibleRange::new(2.0, 4.0).unwrap(),
                siblings: 1,
            }
        );
        assert!(stale.iter().all(|c| c.windows.borrow().is_empty()));
        assert!(old_listener.ranges.borrow().is_empty());
        assert_eq!(group.reset_zoom(), VisibleRange::new(0.0, 10.0));
        assert_eq!(old_listener.resets.get(), 0);
    }
}
