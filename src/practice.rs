//! The practice session as seen by a UI host.
//!
//! [`Practice`] owns the loaded [`Document`] and its [`PlaybackSession`] and
//! is the single source of truth for both. The host renders from it and
//! forwards user commands and metronome ticks to it.

use log::{info, warn};

use crate::{
    config::PlaybackSettings,
    detector::MeasureDetector,
    document::{AnalysisApplied, AnalysisJob, AnalysisResult, AnalysisStatus, Document},
    error::{ConfigError, DetectionError, StateError},
    page::{Measure, MeasureRef, PageImage},
    sequencer::{ClickOutcome, PlaybackSession, TickCommand, TickOutcome},
};

/// Result of deleting a measure.
#[derive(Debug, Clone, PartialEq)]
pub struct Deleted {
    pub measure: Measure,
    /// Playback was running and had to stop; the host should stop ticking.
    pub playback_stopped: bool,
}

#[derive(Debug, Default)]
pub struct Practice {
    document: Document,
    session: PlaybackSession,
}

impl Practice {
    pub fn new(settings: PlaybackSettings) -> Result<Self, ConfigError> {
        Ok(Self {
            document: Document::new(),
            session: PlaybackSession::new(settings)?,
        })
    }

    /// Replaces the document and starts a fresh session with the same
    /// settings. Results of analyses still running for the old document will
    /// be discarded when they arrive.
    pub fn load(&mut self, document: Document) {
        info!("loaded document with {} pages", document.page_count());
        self.document = document;
        self.session = PlaybackSession::with_settings(self.session.settings().clone());
    }

    /// [`Practice::load`] for already decoded pages.
    pub fn load_pages(&mut self, pages: impl IntoIterator<Item = PageImage>) {
        self.load(Document::from_pages(pages));
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn session(&self) -> &PlaybackSession {
        &self.session
    }

    pub fn set_settings(
        &mut self,
        settings: PlaybackSettings,
    ) -> Result<Option<TickCommand>, ConfigError> {
        Ok(self
            .session
            .set_settings(settings)?
            .map(|period| TickCommand::Start { period }))
    }

    pub fn status(&self, page: usize) -> AnalysisStatus {
        self.document.status(page)
    }

    pub fn measures(&self, page: usize) -> &[Measure] {
        self.document.measures(page)
    }

    pub fn begin_analysis(&mut self, page: usize) -> Result<Option<AnalysisJob>, DetectionError> {
        self.document.begin_analysis(page)
    }

    pub fn cancel_analysis(&mut self, page: usize) -> bool {
        self.document.cancel_analysis(page)
    }

    pub fn complete_analysis(&mut self, result: AnalysisResult) -> AnalysisApplied {
        self.document.complete_analysis(result)
    }

    pub fn analyze_page<D: MeasureDetector + ?Sized>(
        &mut self,
        page: usize,
        detector: &D,
    ) -> Result<AnalysisApplied, DetectionError> {
        self.document.analyze_page(page, detector)
    }

    /// Analyzes every page in turn. Failures stay confined to their page.
    pub fn analyze_all<D: MeasureDetector + ?Sized>(
        &mut self,
        detector: &D,
    ) -> Vec<(usize, AnalysisApplied)> {
        let pages: Vec<usize> = (0..self.document.page_count())
            .filter(|&page| self.document.page(page).is_some())
            .collect();
        pages
            .into_iter()
            .filter_map(|page| match self.document.analyze_page(page, detector) {
                Ok(applied) => Some((page, applied)),
                Err(err) => {
                    warn!("page {page}: {err}");
                    None
                }
            })
            .collect()
    }

    pub fn click(&mut self, page: usize, index: usize) -> Result<ClickOutcome, StateError> {
        self.session.click(&self.document, MeasureRef::new(page, index))
    }

    pub fn toggle_play(&mut self) -> Result<TickCommand, StateError> {
        self.session.toggle_play(&self.document)
    }

    pub fn tick(&mut self) -> TickOutcome {
        self.session.on_tick(&self.document)
    }

    pub fn is_played(&self, page: usize, index: usize) -> bool {
        self.session.is_played(&self.document, MeasureRef::new(page, index))
    }

    pub fn played_range(&self) -> Option<(MeasureRef, MeasureRef)> {
        self.session.played_range(&self.document)
    }

    pub fn delete_measure(&mut self, page: usize, index: usize) -> Result<Deleted, StateError> {
        let measure = self.document.delete_measure(MeasureRef::new(page, index))?;
        let playback_stopped = self.session.forget(measure.id);
        Ok(Deleted {
            measure,
            playback_stopped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::PixelRect;
    use image::DynamicImage;

    fn four_per_page(_: &DynamicImage) -> Result<String, DetectionError> {
        let boxes: Vec<PixelRect> = (0..4)
            .map(|i| PixelRect::new(10.0 + 100.0 * i as f64, 40.0, 100.0, 60.0))
            .collect();
        serde_json::to_string(&boxes).map_err(DetectionError::from)
    }

    fn practice(pages: usize) -> Practice {
        let mut practice = Practice::default();
        practice.load_pages(
            (0..pages).map(|_| PageImage::new(DynamicImage::new_luma8(800, 600)).unwrap()),
        );
        let detector = crate::detector::BackendDetector::new(four_per_page);
        practice.analyze_all(&detector);
        practice
    }

    #[test]
    fn second_advance_crosses_to_next_page() {
        let mut practice = practice(2);
        assert_eq!(practice.click(0, 2), Ok(ClickOutcome::Armed));
        practice.toggle_play().unwrap();

        assert!(matches!(
            practice.tick(),
            TickOutcome::Hid(_, h) if h.measure == MeasureRef::new(0, 3)
        ));
        for _ in 1..4 {
            practice.tick();
        }
        assert!(matches!(
            practice.tick(),
            TickOutcome::Hid(_, h) if h.measure == MeasureRef::new(1, 0)
        ));
        assert_eq!(
            practice.played_range(),
            Some((MeasureRef::new(0, 2), MeasureRef::new(1, 0)))
        );
    }

    #[test]
    fn second_advance_on_last_page_stops() {
        let mut practice = practice(1);
        practice.click(0, 2).unwrap();
        practice.toggle_play().unwrap();
        practice.tick();
        for _ in 1..4 {
            practice.tick();
        }
        assert!(matches!(practice.tick(), TickOutcome::Stopped(_, StateError::Exhausted)));
        assert!(!practice.session().is_playing());
    }

    #[test]
    fn deleting_the_clicked_measure_stops_playback() {
        let mut practice = practice(1);
        practice.click(0, 1).unwrap();
        practice.toggle_play().unwrap();
        practice.tick();

        let deleted = practice.delete_measure(0, 1).unwrap();
        assert!(deleted.playback_stopped);
        assert_eq!(practice.measures(0).len(), 3);
        assert!(!practice.is_played(0, 1));
        assert!(!practice.is_played(0, 3));
        assert!(!practice.is_played(0, 10));
        assert_eq!(practice.toggle_play(), Err(StateError::NothingSelected));
    }

    #[test]
    fn loading_discards_the_session() {
        let mut practice = practice(1);
        practice.click(0, 0).unwrap();
        let job = practice.begin_analysis(0).unwrap().unwrap();

        practice.load_pages([PageImage::new(DynamicImage::new_luma8(800, 600)).unwrap()]);
        assert_eq!(practice.played_range(), None);
        assert_eq!(practice.toggle_play(), Err(StateError::NothingSelected));

        let stale = job.run(&crate::detector::BackendDetector::new(four_per_page));
        assert_eq!(practice.complete_analysis(stale), AnalysisApplied::Discarded);
        assert_eq!(practice.status(0), AnalysisStatus::NotAnalyzed);
    }

    #[test]
    fn loading_keeps_the_playback_settings() {
        let settings = PlaybackSettings::new(90.0, 3, 0.1, 0.9).unwrap();
        let mut practice = Practice::new(settings.clone()).unwrap();
        practice.load_pages([PageImage::new(DynamicImage::new_luma8(800, 600)).unwrap()]);
        assert_eq!(practice.session().settings(), &settings);

        let job = practice.begin_analysis(0).unwrap().unwrap();
        assert_eq!(job.page(), 0);
        assert!(practice.cancel_analysis(0));
        assert_eq!(practice.status(0), AnalysisStatus::NotAnalyzed);
    }
}
