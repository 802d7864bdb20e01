//! Metronome-driven measure hiding.
//!
//! A [`PlaybackSession`] remembers which measure was clicked and how far the
//! hidden range has grown. It stores measure identities rather than
//! positions, and resolves them against the [`Document`] on every use, so
//! deletions and re-analysis can never make it index a measure that is gone.
//! Anything it cannot resolve stops playback.

use std::time::Duration;

use log::{debug, info};

use crate::{
    config::{HideTransition, PlaybackSettings},
    document::Document,
    error::{ConfigError, StateError},
    page::{MeasureId, MeasureRef},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// Nothing selected.
    Idle,
    /// A start measure is selected, the metronome is not running.
    Armed,
    /// The host is ticking.
    Playing,
}

/// One metronome beat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    /// Position within the measure, starting at 0.
    pub beat: u32,
    /// First beat of a measure; the beeper accents it.
    pub downbeat: bool,
}

/// Counts beats within a measure.
#[derive(Debug, Clone)]
pub struct Metronome {
    beats_per_measure: u32,
    next_beat: u32,
}

impl Metronome {
    pub fn new(beats_per_measure: u32) -> Self {
        Self {
            beats_per_measure: beats_per_measure.max(1),
            next_beat: 0,
        }
    }

    pub fn tick(&mut self) -> Tick {
        let beat = self.next_beat;
        self.next_beat = (beat + 1) % self.beats_per_measure;
        Tick {
            beat,
            downbeat: beat == 0,
        }
    }

    pub fn reset(&mut self) {
        self.next_beat = 0;
    }
}

/// A hide transition waiting to be applied by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledHide {
    pub measure: MeasureRef,
    pub id: MeasureId,
    pub transition: HideTransition,
}

/// What the host should do after a click.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickOutcome {
    /// A new start measure is selected; toggle play to start.
    Armed,
    /// Playback was running and has stopped; stop ticking.
    Stopped,
}

/// What the host should do with its tick driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickCommand {
    Start { period: Duration },
    Stop,
}

/// Result of feeding one tick to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Not playing; the tick was ignored.
    Ignored,
    /// An ordinary beat.
    Beat(Tick),
    /// A downbeat that hid the next measure.
    Hid(Tick, ScheduledHide),
    /// A downbeat with nothing left to hide; playback stopped.
    Stopped(Tick, StateError),
}

#[derive(Debug, Clone)]
pub struct PlaybackSession {
    settings: PlaybackSettings,
    state: PlaybackState,
    clicked: Option<MeasureId>,
    hidden: Option<MeasureId>,
    metronome: Metronome,
    pending: Option<ScheduledHide>,
}

impl Default for PlaybackSession {
    fn default() -> Self {
        Self::with_settings(PlaybackSettings::default())
    }
}

impl PlaybackSession {
    pub fn new(settings: PlaybackSettings) -> Result<Self, ConfigError> {
        settings.validate()?;
        Ok(Self::with_settings(settings))
    }

    /// Builds a session from settings that were already validated.
    pub(crate) fn with_settings(settings: PlaybackSettings) -> Self {
        Self {
            metronome: Metronome::new(settings.beats_per_measure),
            settings,
            state: PlaybackState::Idle,
            clicked: None,
            hidden: None,
            pending: None,
        }
    }

    pub fn settings(&self) -> &PlaybackSettings {
        &self.settings
    }

    /// Replaces the settings and restarts the beat count.
    ///
    /// Returns the new tick period when playing, since the host has to
    /// restart its driver.
    pub fn set_settings(
        &mut self,
        settings: PlaybackSettings,
    ) -> Result<Option<Duration>, ConfigError> {
        settings.validate()?;
        self.metronome = Metronome::new(settings.beats_per_measure);
        self.settings = settings;
        Ok((self.state == PlaybackState::Playing).then(|| self.settings.tick_period()))
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    /// Position of the start measure.
    pub fn clicked(&self, doc: &Document) -> Option<MeasureRef> {
        self.clicked.and_then(|id| doc.locate(id))
    }

    /// Position of the furthest hidden measure.
    pub fn hidden(&self, doc: &Document) -> Option<MeasureRef> {
        self.hidden.and_then(|id| doc.locate(id))
    }

    /// The `[clicked, hidden]` range, when both ends resolve.
    pub fn played_range(&self, doc: &Document) -> Option<(MeasureRef, MeasureRef)> {
        Some((self.clicked(doc)?, self.hidden(doc)?))
    }

    /// Selects the start measure. Stops playback if it was running.
    pub fn click(&mut self, doc: &Document, at: MeasureRef) -> Result<ClickOutcome, StateError> {
        let measure = doc.measure(at).ok_or(StateError::UnknownMeasure {
            page: at.page,
            index: at.index,
        })?;
        let was_playing = self.is_playing();
        self.halt();
        self.clicked = Some(measure.id);
        self.hidden = None;
        self.state = PlaybackState::Armed;
        debug!("clicked measure {} on page {}", at.index, at.page);
        Ok(if was_playing {
            ClickOutcome::Stopped
        } else {
            ClickOutcome::Armed
        })
    }

    /// Starts or stops playback.
    pub fn toggle_play(&mut self, doc: &Document) -> Result<TickCommand, StateError> {
        match self.state {
            PlaybackState::Playing => {
                self.halt();
                info!("playback stopped");
                Ok(TickCommand::Stop)
            }
            PlaybackState::Armed => {
                if self.clicked(doc).is_none() {
                    return Err(self.fail(StateError::StaleSelection));
                }
                self.metronome.reset();
                self.state = PlaybackState::Playing;
                info!("playback started at {} bpm", self.settings.bpm);
                Ok(TickCommand::Start {
                    period: self.settings.tick_period(),
                })
            }
            PlaybackState::Idle => Err(StateError::NothingSelected),
        }
    }

    /// Feeds one metronome beat; every downbeat advances by one measure.
    pub fn on_tick(&mut self, doc: &Document) -> TickOutcome {
        if !self.is_playing() {
            return TickOutcome::Ignored;
        }
        let tick = self.metronome.tick();
        if !tick.downbeat {
            return TickOutcome::Beat(tick);
        }
        match self.advance(doc) {
            Ok(hide) => TickOutcome::Hid(tick, hide),
            Err(err) => TickOutcome::Stopped(tick, err),
        }
    }

    /// Hides the measure after the current one (the last hidden, or the
    /// clicked one at first) and schedules its transition.
    ///
    /// On failure the hidden position is left alone and playback stops. A
    /// selection that no longer resolves is also cleared.
    pub fn advance(&mut self, doc: &Document) -> Result<ScheduledHide, StateError> {
        let next = match self.next_position(doc) {
            Ok(next) => next,
            Err(err) => return Err(self.fail(err)),
        };
        let Some(measure) = doc.measure(next) else {
            return Err(self.fail(StateError::StaleSelection));
        };
        let hide = ScheduledHide {
            measure: next,
            id: measure.id,
            transition: self.settings.hide_transition(),
        };
        self.hidden = Some(measure.id);
        self.pending = Some(hide);
        debug!("hiding measure {} on page {}", next.index, next.page);
        Ok(hide)
    }

    fn next_position(&self, doc: &Document) -> Result<MeasureRef, StateError> {
        let current = self
            .hidden
            .or(self.clicked)
            .ok_or(StateError::NothingSelected)?;
        let at = doc.locate(current).ok_or(StateError::StaleSelection)?;
        doc.next_after(at).ok_or(StateError::Exhausted)
    }

    /// True when `at` lies within `[clicked, hidden]` in reading order.
    pub fn is_played(&self, doc: &Document, at: MeasureRef) -> bool {
        if doc.measure(at).is_none() {
            return false;
        }
        match self.played_range(doc) {
            Some((from, to)) => from <= at && at <= to,
            None => false,
        }
    }

    /// The transition scheduled by the last downbeat, not yet taken.
    pub fn pending_hide(&self) -> Option<&ScheduledHide> {
        self.pending.as_ref()
    }

    pub fn take_pending_hide(&mut self) -> Option<ScheduledHide> {
        self.pending.take()
    }

    /// Reacts to the removal of measure `id`.
    ///
    /// Removing either end of the played range clears the selection and
    /// stops playback. Returns whether playback was stopped.
    pub fn forget(&mut self, id: MeasureId) -> bool {
        if self.clicked != Some(id) && self.hidden != Some(id) {
            return false;
        }
        let was_playing = self.is_playing();
        self.fail(StateError::StaleSelection);
        was_playing
    }

    /// Vertical scroll offset that brings the hidden measure into view, 20%
    /// below the top of the viewport.
    pub fn scroll_offset(
        &self,
        doc: &Document,
        page_top: f64,
        page_height: f64,
        viewport_height: f64,
    ) -> Option<f64> {
        let at = self.hidden(doc)?;
        let measure = doc.measure(at)?;
        Some(page_top + measure.rect.y * page_height - viewport_height * 0.20)
    }

    /// Stops the metronome and cancels the scheduled transition.
    fn halt(&mut self) {
        if self.state == PlaybackState::Playing {
            self.state = PlaybackState::Armed;
        }
        self.pending = None;
        self.metronome.reset();
    }

    fn fail(&mut self, err: StateError) -> StateError {
        info!("playback stopped: {err}");
        self.halt();
        if err != StateError::Exhausted {
            self.clicked = None;
            self.hidden = None;
            self.state = PlaybackState::Idle;
        }
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        detector::MeasureDetector,
        error::DetectionError,
        page::{PageImage, PixelRect},
    };
    use image::DynamicImage;
    use pretty_assertions::assert_eq;

    struct Row(usize);

    impl MeasureDetector for Row {
        fn detect(&self, _: &DynamicImage) -> Result<Vec<PixelRect>, DetectionError> {
            Ok((0..self.0)
                .map(|i| PixelRect::new(100.0 * i as f64, 100.0, 100.0, 50.0))
                .collect())
        }
    }

    /// A document whose pages hold the given numbers of measures.
    fn document(counts: &[usize]) -> Document {
        let pages = counts
            .iter()
            .map(|_| PageImage::new(DynamicImage::new_luma8(1000, 1000)).unwrap());
        let mut doc = Document::from_pages(pages);
        for (page, &count) in counts.iter().enumerate() {
            doc.analyze_page(page, &Row(count)).unwrap();
        }
        doc
    }

    fn at(page: usize, index: usize) -> MeasureRef {
        MeasureRef::new(page, index)
    }

    fn playing(doc: &Document, start: MeasureRef) -> PlaybackSession {
        let mut session = PlaybackSession::default();
        session.click(doc, start).unwrap();
        session.toggle_play(doc).unwrap();
        session
    }

    #[test]
    fn metronome_cycles_through_the_measure() {
        let mut metronome = Metronome::new(3);
        let beats: Vec<(u32, bool)> = (0..7)
            .map(|_| metronome.tick())
            .map(|t| (t.beat, t.downbeat))
            .collect();
        assert_eq!(
            beats,
            vec![(0, true), (1, false), (2, false), (0, true), (1, false), (2, false), (0, true)]
        );
        metronome.reset();
        assert!(metronome.tick().downbeat);
    }

    #[test]
    fn nothing_is_played_before_a_click() {
        let doc = document(&[4]);
        let session = PlaybackSession::default();
        assert_eq!(session.state(), PlaybackState::Idle);
        for index in 0..4 {
            assert!(!session.is_played(&doc, at(0, index)));
        }
    }

    #[test]
    fn click_arms_and_toggle_starts_ticking() {
        let doc = document(&[4]);
        let mut session = PlaybackSession::default();
        assert_eq!(session.toggle_play(&doc), Err(StateError::NothingSelected));

        assert_eq!(session.click(&doc, at(0, 2)), Ok(ClickOutcome::Armed));
        assert_eq!(session.state(), PlaybackState::Armed);
        assert_eq!(session.clicked(&doc), Some(at(0, 2)));
        assert_eq!(session.hidden(&doc), None);
        // Hidden end unset: nothing counts as played yet.
        assert!(!session.is_played(&doc, at(0, 2)));

        assert_eq!(
            session.toggle_play(&doc),
            Ok(TickCommand::Start {
                period: Duration::from_secs(1)
            })
        );
        assert!(session.is_playing());
    }

    #[test]
    fn clicking_an_unknown_measure_is_rejected() {
        let doc = document(&[2]);
        let mut session = PlaybackSession::default();
        assert_eq!(
            session.click(&doc, at(0, 5)),
            Err(StateError::UnknownMeasure { page: 0, index: 5 })
        );
        assert_eq!(session.state(), PlaybackState::Idle);
    }

    #[test]
    fn advance_moves_through_page_then_to_next_page() {
        let doc = document(&[4, 2]);
        let mut session = playing(&doc, at(0, 2));

        assert_eq!(session.advance(&doc).unwrap().measure, at(0, 3));
        assert_eq!(session.hidden(&doc), Some(at(0, 3)));
        assert_eq!(session.advance(&doc).unwrap().measure, at(1, 0));
        assert_eq!(session.advance(&doc).unwrap().measure, at(1, 1));
    }

    #[test]
    fn advance_fails_at_the_end_without_moving() {
        let doc = document(&[4]);
        let mut session = playing(&doc, at(0, 2));

        assert_eq!(session.advance(&doc).unwrap().measure, at(0, 3));
        assert_eq!(session.advance(&doc), Err(StateError::Exhausted));
        assert_eq!(session.hidden(&doc), Some(at(0, 3)));
        assert_eq!(session.state(), PlaybackState::Armed);
        assert_eq!(session.clicked(&doc), Some(at(0, 2)));
    }

    #[test]
    fn single_measure_page_advances_to_next_page() {
        let doc = document(&[1, 3]);
        let mut session = playing(&doc, at(0, 0));
        assert_eq!(session.advance(&doc).unwrap().measure, at(1, 0));
    }

    #[test]
    fn empty_pages_are_skipped() {
        let doc = document(&[1, 0, 2]);
        let mut session = playing(&doc, at(0, 0));
        assert_eq!(session.advance(&doc).unwrap().measure, at(2, 0));
    }

    #[test]
    fn downbeats_drive_the_sequence() {
        let doc = document(&[3]);
        let mut session = playing(&doc, at(0, 0));

        let first = session.on_tick(&doc);
        let TickOutcome::Hid(tick, hide) = first else {
            panic!("expected a hide, got {first:?}");
        };
        assert!(tick.downbeat);
        assert_eq!(hide.measure, at(0, 1));
        assert_eq!(
            hide.transition,
            HideTransition {
                delay: Duration::from_secs(1),
                duration: Duration::from_secs(2),
            }
        );
        assert_eq!(session.take_pending_hide(), Some(hide));

        for beat in 1..4 {
            assert_eq!(
                session.on_tick(&doc),
                TickOutcome::Beat(Tick {
                    beat,
                    downbeat: false
                })
            );
        }
        assert!(matches!(session.on_tick(&doc), TickOutcome::Hid(_, h) if h.measure == at(0, 2)));
        for _ in 1..4 {
            session.on_tick(&doc);
        }
        assert!(matches!(
            session.on_tick(&doc),
            TickOutcome::Stopped(_, StateError::Exhausted)
        ));
        assert!(!session.is_playing());
        assert_eq!(session.on_tick(&doc), TickOutcome::Ignored);
    }

    #[test]
    fn played_range_is_inclusive_and_spans_pages() {
        let doc = document(&[4, 3]);
        let mut session = playing(&doc, at(0, 2));
        for _ in 0..3 {
            session.advance(&doc).unwrap();
        }
        assert_eq!(session.hidden(&doc), Some(at(1, 1)));

        let played: Vec<MeasureRef> = [(0, 0), (0, 1), (0, 2), (0, 3), (1, 0), (1, 1), (1, 2)]
            .into_iter()
            .map(|(p, m)| at(p, m))
            .filter(|&m| session.is_played(&doc, m))
            .collect();
        assert_eq!(played, vec![at(0, 2), at(0, 3), at(1, 0), at(1, 1)]);
        assert!(!session.is_played(&doc, at(1, 99)));
    }

    #[test]
    fn click_while_playing_stops_and_resets() {
        let doc = document(&[4]);
        let mut session = playing(&doc, at(0, 0));
        session.on_tick(&doc);
        assert!(session.pending_hide().is_some());

        assert_eq!(session.click(&doc, at(0, 3)), Ok(ClickOutcome::Stopped));
        assert_eq!(session.state(), PlaybackState::Armed);
        assert_eq!(session.clicked(&doc), Some(at(0, 3)));
        assert_eq!(session.hidden(&doc), None);
        assert_eq!(session.pending_hide(), None);
    }

    #[test]
    fn toggle_stop_keeps_the_hidden_range() {
        let doc = document(&[4]);
        let mut session = playing(&doc, at(0, 0));
        session.on_tick(&doc);
        assert_eq!(session.toggle_play(&doc), Ok(TickCommand::Stop));
        assert_eq!(session.hidden(&doc), Some(at(0, 1)));
        assert_eq!(session.pending_hide(), None);
    }

    #[test]
    fn deleting_before_the_range_keeps_it_consistent() {
        let mut doc = document(&[5]);
        let mut session = playing(&doc, at(0, 2));
        session.advance(&doc).unwrap();

        let removed = doc.delete_measure(at(0, 0)).unwrap();
        assert!(!session.forget(removed.id));

        // Same measures, shifted down by one.
        assert_eq!(session.played_range(&doc), Some((at(0, 1), at(0, 2))));
        assert_eq!(session.advance(&doc).unwrap().measure, at(0, 3));
        assert!(!session.is_played(&doc, at(0, 4)));
    }

    #[test]
    fn deleting_an_end_of_the_range_fails_closed() {
        let mut doc = document(&[5]);
        let mut session = playing(&doc, at(0, 1));
        session.advance(&doc).unwrap();

        let removed = doc.delete_measure(at(0, 2)).unwrap();
        assert!(session.forget(removed.id));
        assert_eq!(session.state(), PlaybackState::Idle);
        assert_eq!(session.advance(&doc), Err(StateError::NothingSelected));
        for index in 0..5 {
            assert!(!session.is_played(&doc, at(0, index)));
        }
    }

    #[test]
    fn reanalysis_under_a_running_session_stops_it() {
        let mut doc = document(&[3]);
        let mut session = playing(&doc, at(0, 0));
        session.advance(&doc).unwrap();

        doc.analyze_page(0, &Row(2)).unwrap();
        assert!(!session.is_played(&doc, at(0, 0)));
        assert_eq!(session.advance(&doc), Err(StateError::StaleSelection));
        assert_eq!(session.state(), PlaybackState::Idle);
    }

    #[test]
    fn settings_change_restarts_the_driver() {
        let doc = document(&[2]);
        let mut session = PlaybackSession::default();
        let faster = PlaybackSettings::new(120.0, 3, 0.0, 0.5).unwrap();
        assert_eq!(session.set_settings(faster.clone()), Ok(None));

        session.click(&doc, at(0, 0)).unwrap();
        session.toggle_play(&doc).unwrap();
        assert_eq!(
            session.set_settings(faster),
            Ok(Some(Duration::from_millis(500)))
        );
        let invalid = PlaybackSettings {
            bpm: -1.0,
            ..PlaybackSettings::default()
        };
        assert!(session.set_settings(invalid).is_err());
    }

    #[test]
    fn scroll_offset_targets_the_hidden_measure() {
        let doc = document(&[2]);
        let mut session = playing(&doc, at(0, 0));
        assert_eq!(session.scroll_offset(&doc, 0.0, 1000.0, 800.0), None);
        session.advance(&doc).unwrap();
        // Measure top is at 100px on a page starting at 2000px.
        assert_eq!(session.scroll_offset(&doc, 2000.0, 1000.0, 800.0), Some(1940.0));
    }
}
