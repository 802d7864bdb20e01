//! Pages of a loaded score with their detection status and measures.
//!
//! Detection is fire-and-forget: [`Document::begin_analysis`] hands out an
//! [`AnalysisJob`] that owns everything it needs and can run on any thread;
//! its result is fed back through [`Document::complete_analysis`]. At most one
//! job per page is in flight, and results of jobs issued for a document that
//! has since been replaced are discarded.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, warn};
use serde::Serialize;

use crate::{
    detector::MeasureDetector,
    error::{DecodeError, DetectionError, StateError},
    page::{Measure, MeasureId, MeasureRef, PageImage, PixelRect},
};

static NEXT_DOCUMENT_SERIAL: AtomicU64 = AtomicU64::new(1);

/// Progress of measure detection for one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AnalysisStatus {
    NotAnalyzed,
    Analyzing,
    Done,
    Failed,
}

/// Everything the document knows about one page.
#[derive(Debug, Clone)]
pub struct PageRecord {
    /// `None` when the renderer's output could not be decoded.
    pub image: Option<PageImage>,
    pub status: AnalysisStatus,
    pub measures: Vec<Measure>,
}

/// A detection request for one page, detached from the document.
///
/// Each job is applied at most once. A job that will never be run must be
/// released with [`Document::cancel_analysis`].
#[derive(Debug)]
pub struct AnalysisJob {
    document: u64,
    page: usize,
    image: PageImage,
}

impl AnalysisJob {
    pub fn page(&self) -> usize {
        self.page
    }

    pub fn image(&self) -> &PageImage {
        &self.image
    }

    /// Runs `detector` on the page. Safe to call from a worker thread.
    pub fn run<D: MeasureDetector + ?Sized>(self, detector: &D) -> AnalysisResult {
        let outcome = detector.detect(self.image.image());
        AnalysisResult {
            document: self.document,
            page: self.page,
            width: self.image.width(),
            height: self.image.height(),
            outcome,
        }
    }
}

/// The output of an [`AnalysisJob`], waiting to be applied.
#[derive(Debug)]
pub struct AnalysisResult {
    document: u64,
    page: usize,
    width: u32,
    height: u32,
    outcome: Result<Vec<PixelRect>, DetectionError>,
}

impl AnalysisResult {
    pub fn page(&self) -> usize {
        self.page
    }
}

/// What applying an [`AnalysisResult`] did.
#[derive(Debug, PartialEq, Eq)]
pub enum AnalysisApplied {
    /// The page now holds this many measures.
    Stored(usize),
    /// Detection failed; the page kept its previous measures.
    Failed,
    /// The result belonged to another document and was dropped.
    Discarded,
}

/// The pages of one loaded file, keyed by page index.
#[derive(Debug)]
pub struct Document {
    serial: u64,
    pages: BTreeMap<usize, PageRecord>,
    next_measure_id: u64,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        Self {
            serial: NEXT_DOCUMENT_SERIAL.fetch_add(1, Ordering::Relaxed),
            pages: BTreeMap::new(),
            next_measure_id: 0,
        }
    }

    /// Builds a document from already decoded pages, numbered from 0.
    pub fn from_pages(pages: impl IntoIterator<Item = PageImage>) -> Self {
        let mut document = Self::new();
        for (index, page) in pages.into_iter().enumerate() {
            document.insert_page(index, page);
        }
        document
    }

    /// Stores a rendered page, replacing any page at `index`.
    pub fn insert_page(&mut self, index: usize, image: PageImage) {
        self.pages.insert(
            index,
            PageRecord {
                image: Some(image),
                status: AnalysisStatus::NotAnalyzed,
                measures: Vec::new(),
            },
        );
    }

    /// Decodes and stores an encoded page.
    ///
    /// An undecodable page still occupies its index, marked failed, so the
    /// other pages keep their numbering.
    pub fn insert_encoded_page(&mut self, index: usize, bytes: &[u8]) -> Result<(), DecodeError> {
        match PageImage::decode(bytes) {
            Ok(image) => {
                self.insert_page(index, image);
                Ok(())
            }
            Err(err) => {
                warn!("page {index}: {err}");
                self.pages.insert(
                    index,
                    PageRecord {
                        image: None,
                        status: AnalysisStatus::Failed,
                        measures: Vec::new(),
                    },
                );
                Err(err)
            }
        }
    }

    /// Number of pages, counting gaps below the highest index as pages.
    pub fn page_count(&self) -> usize {
        self.pages.last_key_value().map_or(0, |(&index, _)| index + 1)
    }

    pub fn page(&self, index: usize) -> Option<&PageRecord> {
        self.pages.get(&index)
    }

    pub fn status(&self, page: usize) -> AnalysisStatus {
        self.pages
            .get(&page)
            .map_or(AnalysisStatus::NotAnalyzed, |record| record.status)
    }

    /// Measures of `page` in reading order; empty for unknown pages.
    pub fn measures(&self, page: usize) -> &[Measure] {
        self.pages
            .get(&page)
            .map(|record| record.measures.as_slice())
            .unwrap_or(&[])
    }

    pub fn measure(&self, at: MeasureRef) -> Option<&Measure> {
        self.measures(at.page).get(at.index)
    }

    /// Current position of the measure with identity `id`, if it still exists.
    pub fn locate(&self, id: MeasureId) -> Option<MeasureRef> {
        self.pages.iter().find_map(|(&page, record)| {
            record
                .measures
                .iter()
                .position(|m| m.id == id)
                .map(|index| MeasureRef::new(page, index))
        })
    }

    /// The measure following `at` in reading order, skipping empty pages.
    pub fn next_after(&self, at: MeasureRef) -> Option<MeasureRef> {
        if at.index + 1 < self.measures(at.page).len() {
            return Some(MeasureRef::new(at.page, at.index + 1));
        }
        self.pages
            .range(at.page + 1..)
            .find(|(_, record)| !record.measures.is_empty())
            .map(|(&page, _)| MeasureRef::new(page, 0))
    }

    /// Marks `page` as analyzing and returns the job to run.
    ///
    /// Returns `Ok(None)` when the page is already being analyzed.
    pub fn begin_analysis(&mut self, page: usize) -> Result<Option<AnalysisJob>, DetectionError> {
        let record = self
            .pages
            .get_mut(&page)
            .ok_or(DetectionError::UnknownPage { page })?;
        if record.status == AnalysisStatus::Analyzing {
            debug!("page {page}: analysis already in flight");
            return Ok(None);
        }
        let image = record
            .image
            .clone()
            .ok_or(DetectionError::MissingImage { page })?;
        record.status = AnalysisStatus::Analyzing;
        Ok(Some(AnalysisJob {
            document: self.serial,
            page,
            image,
        }))
    }

    /// Gives up on the job in flight for `page` so the page can be analyzed
    /// again. Returns `false` if no analysis was running.
    ///
    /// A result for the cancelled job that still arrives is applied like any
    /// other.
    pub fn cancel_analysis(&mut self, page: usize) -> bool {
        match self.pages.get_mut(&page) {
            Some(record) if record.status == AnalysisStatus::Analyzing => {
                record.status = AnalysisStatus::NotAnalyzed;
                debug!("page {page}: analysis cancelled");
                true
            }
            _ => false,
        }
    }

    /// Applies a finished job, replacing the page's measures wholesale.
    pub fn complete_analysis(&mut self, result: AnalysisResult) -> AnalysisApplied {
        let page = result.page;
        if result.document != self.serial {
            debug!("page {page}: dropping result for a replaced document");
            return AnalysisApplied::Discarded;
        }
        if !self.pages.contains_key(&page) {
            return AnalysisApplied::Discarded;
        }

        match result.outcome {
            Ok(rects) => {
                let measures: Vec<Measure> = rects
                    .iter()
                    .map(|rect| Measure {
                        id: self.allocate_id(),
                        rect: rect.normalized(result.width, result.height),
                    })
                    .collect();
                let count = measures.len();
                let Some(record) = self.pages.get_mut(&page) else {
                    return AnalysisApplied::Discarded;
                };
                record.measures = measures;
                record.status = AnalysisStatus::Done;
                debug!("page {page}: {count} measures");
                AnalysisApplied::Stored(count)
            }
            Err(err) => {
                warn!("page {page}: detection failed: {err}");
                if let Some(record) = self.pages.get_mut(&page) {
                    record.status = AnalysisStatus::Failed;
                }
                AnalysisApplied::Failed
            }
        }
    }

    fn allocate_id(&mut self) -> MeasureId {
        let id = MeasureId(self.next_measure_id);
        self.next_measure_id += 1;
        id
    }

    /// Runs detection for `page` in place.
    pub fn analyze_page<D: MeasureDetector + ?Sized>(
        &mut self,
        page: usize,
        detector: &D,
    ) -> Result<AnalysisApplied, DetectionError> {
        match self.begin_analysis(page)? {
            Some(job) => Ok(self.complete_analysis(job.run(detector))),
            None => Ok(AnalysisApplied::Discarded),
        }
    }

    /// Removes a measure; later measures on the page move down by one.
    pub fn delete_measure(&mut self, at: MeasureRef) -> Result<Measure, StateError> {
        let unknown = StateError::UnknownMeasure {
            page: at.page,
            index: at.index,
        };
        let record = self.pages.get_mut(&at.page).ok_or(unknown.clone())?;
        if at.index >= record.measures.len() {
            return Err(unknown);
        }
        Ok(record.measures.remove(at.index))
    }
}
