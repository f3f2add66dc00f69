//! Job analysis: solve a finished observation, find the variable stars in
//! its field and keep their bookkeeping up to date; optionally render an
//! annotated preview.

use crate::catalog::{StarCatalog, VarStarRecord};
use crate::client::Observatory;
use crate::coords::SkyPosition;
use crate::error::{Result, ScopeError};
use crate::fits::{FitsFrame, ImagePlane};
use crate::render::{self, LabelStyle, Marker, COMP_STAR_COLOR, VAR_STAR_COLOR};
use crate::solver::{PlateSolver, Wcs};
use crate::storage::{Database, VarStarEntry};
use crate::types::{JobInfo, SiteTime};
use std::path::PathBuf;

/// Rows/columns of readout overscan dropped before rendering
pub const OVERSCAN: usize = 32;
/// Marker size in pixels
pub const MARKER_SIZE: f32 = 30.0;

/// Result of a successful analysis
#[derive(Debug, Clone)]
pub struct Analysis {
    pub jid: u64,
    pub rid: u64,
    pub target: String,
    pub completion: Option<SiteTime>,
    pub filters: Vec<String>,
    pub wcs: Wcs,
    pub stars: Vec<VarStarRecord>,
}

#[derive(Debug, Clone)]
pub enum AnalysisOutcome {
    /// The job was processed before and `reprocess` was not requested
    AlreadyDone,
    /// No frame could be solved; the cube was cached for later work
    Unsolved,
    Analysed(Analysis),
}

#[derive(Debug, Clone)]
pub enum ProcessOutcome {
    AlreadyDone,
    /// Unsolved job with a plain preview
    Unsolved { preview: PathBuf },
    Rendered { analysis: Analysis, preview: PathBuf },
}

/// Job, request and frames gathered before any solving
struct Prepared {
    job: JobInfo,
    rid: u64,
    target: String,
    frames: Vec<FitsFrame>,
}

impl Prepared {
    fn filters(&self) -> Vec<String> {
        self.frames
            .iter()
            .map(|f| f.filter().unwrap_or("?").to_string())
            .collect()
    }
}

/// Analysis pipeline over the observatory, solver, catalog and database
pub struct Pipeline<'a> {
    observatory: &'a dyn Observatory,
    solver: &'a dyn PlateSolver,
    catalog: &'a dyn StarCatalog,
    db: &'a Database,
    output_dir: PathBuf,
    labels: Option<&'a LabelStyle>,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        observatory: &'a dyn Observatory,
        solver: &'a dyn PlateSolver,
        catalog: &'a dyn StarCatalog,
        db: &'a Database,
    ) -> Self {
        Self {
            observatory,
            solver,
            catalog,
            db,
            output_dir: PathBuf::from("."),
            labels: None,
        }
    }

    /// Directory for rendered previews
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Font for marker labels; previews carry bare markers without one
    pub fn with_labels(mut self, labels: Option<&'a LabelStyle>) -> Self {
        self.labels = labels;
        self
    }

    async fn prepare(&self, jid: u64, rid: Option<u64>, layer: Option<usize>) -> Result<Prepared> {
        let job = self.observatory.job(jid).await?;
        let rid = match rid.or_else(|| job.primary_request_id()) {
            Some(rid) => rid,
            None => return Err(ScopeError::NotFound(format!("request of job {jid}"))),
        };
        let req = self.observatory.request(rid).await?;
        let target = req.target();

        let completion = job
            .completion
            .as_ref()
            .map(|c| c.to_string())
            .unwrap_or_default();
        tracing::info!("J{}:R{} ({}) {}", jid, rid, target, completion);

        let mut frames = self.observatory.frames(&job).await?;
        if let Some(layer) = layer {
            if layer >= frames.len() {
                return Err(ScopeError::NotFound(format!(
                    "layer {} of job {} ({} frames)",
                    layer,
                    jid,
                    frames.len()
                )));
            }
            frames = vec![frames.swap_remove(layer)];
        }

        let prepared = Prepared {
            job,
            rid,
            target,
            frames,
        };
        tracing::info!("Filters: {}", prepared.filters().join(" "));
        Ok(prepared)
    }

    /// First frame that solves
    async fn solve_any(&self, frames: &[FitsFrame]) -> Result<Option<Wcs>> {
        for frame in frames {
            match self.solver.solve(frame, false).await {
                Ok(Some(wcs)) => return Ok(Some(wcs)),
                Ok(None) => tracing::debug!("{}: not solved", frame.name),
                Err(ScopeError::Solver(msg)) => tracing::warn!("{}: {}", frame.name, msg),
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    /// Add the job to a star's record, fetching its comparison sequence
    /// while the record has none
    async fn record_star(&self, name: &str, jid: u64) -> Result<VarStarEntry> {
        let mut entry = self
            .db
            .variable_star(name)
            .await?
            .unwrap_or_else(|| VarStarEntry::new(name));
        entry.jobs.insert(jid);

        if entry.sequence.is_none() {
            entry.sequence = self.catalog.comparison_sequence(name).await?;
        }
        self.db.save_variable_star(&entry).await?;

        match &entry.sequence {
            Some(seq) => tracing::info!("{} seq:{} ({})", name, seq.chart_id, seq.stars.len()),
            None => tracing::info!("{}", name),
        }
        Ok(entry)
    }

    async fn analyse_prepared(&self, p: &Prepared, reprocess: bool) -> Result<AnalysisOutcome> {
        let jid = p.job.jid;
        if !reprocess && self.db.is_processed(jid).await? {
            tracing::info!("J{}: done", jid);
            return Ok(AnalysisOutcome::AlreadyDone);
        }

        let Some(wcs) = self.solve_any(&p.frames).await? else {
            tracing::warn!("J{}: cannot solve image", jid);
            self.observatory.cache_cube(&p.job).await?;
            return Ok(AnalysisOutcome::Unsolved);
        };

        let stars = self.catalog.variable_stars_in(&wcs.extent()).await?;
        for star in &stars {
            self.record_star(&star.name, jid).await?;
        }

        Ok(AnalysisOutcome::Analysed(Analysis {
            jid,
            rid: p.rid,
            target: p.target.clone(),
            completion: p.job.completion.clone(),
            filters: p.filters(),
            wcs,
            stars,
        }))
    }

    /// Solve a job, record the variable stars in its field and mark it done
    pub async fn analyse_job(&self, jid: u64, rid: Option<u64>, reprocess: bool) -> Result<AnalysisOutcome> {
        let prepared = self.prepare(jid, rid, None).await?;
        let outcome = self.analyse_prepared(&prepared, reprocess).await?;
        if let AnalysisOutcome::Analysed(_) = &outcome {
            self.db.mark_processed(jid, &prepared.job.request_ids()).await?;
        }
        Ok(outcome)
    }

    /// Analyse a job and write an annotated preview `J<jid>.png`.
    ///
    /// `layer` restricts the work to one frame of the archive. The job is
    /// marked processed only once the preview is on disk.
    pub async fn process_job(&self, jid: u64, reprocess: bool, layer: Option<usize>) -> Result<ProcessOutcome> {
        let prepared = self.prepare(jid, None, layer).await?;
        let preview = self.output_dir.join(format!("J{jid}.png"));

        match self.analyse_prepared(&prepared, reprocess).await? {
            AnalysisOutcome::AlreadyDone => Ok(ProcessOutcome::AlreadyDone),
            AnalysisOutcome::Unsolved => {
                let img = render::grayscale_image(&preview_plane(&prepared.frames)?);
                render::save_png(&img, &preview)?;
                Ok(ProcessOutcome::Unsolved { preview })
            }
            AnalysisOutcome::Analysed(analysis) => {
                let mut img = self.compose(&prepared.frames, &analysis.wcs).await?;
                let (markers, chart) = self.markers(&analysis).await?;
                render::draw_markers(&mut img, &markers, MARKER_SIZE, self.labels);
                if let (Some(style), Some(chart)) = (self.labels, chart) {
                    style.draw(&mut img, &chart, 2, 2, COMP_STAR_COLOR);
                }
                render::save_png(&img, &preview)?;
                self.db.mark_processed(jid, &prepared.job.request_ids()).await?;
                tracing::info!("J{}: preview {}", jid, preview.display());
                Ok(ProcessOutcome::Rendered { analysis, preview })
            }
        }
    }

    /// Variable stars on the image plus the target's comparison stars, and
    /// the chart id of that comparison sequence
    async fn markers(&self, analysis: &Analysis) -> Result<(Vec<Marker>, Option<String>)> {
        let wcs = &analysis.wcs;
        let mut markers = Vec::new();
        let mut push = |pos: &SkyPosition, color, label: String| {
            if !wcs.contains(pos) {
                return;
            }
            if let Some((x, y)) = wcs.sky_to_pixel(pos.ra_deg, pos.dec_deg) {
                markers.push(Marker {
                    x,
                    y,
                    color,
                    label: Some(label),
                });
            }
        };

        for star in &analysis.stars {
            push(&star.position, VAR_STAR_COLOR, var_star_label(star));
        }

        let mut chart = None;
        let target = analysis.target.to_lowercase();
        if let Some(star) = analysis.stars.iter().find(|s| s.name.trim().to_lowercase() == target) {
            if let Some(seq) = self.db.variable_star(&star.name).await?.and_then(|e| e.sequence) {
                for comp in &seq.stars {
                    push(&comp.position, COMP_STAR_COLOR, comp.label.clone());
                }
                chart = Some(seq.chart_id);
            }
        }

        Ok((markers, chart))
    }

    /// Solutions of all frames, `None` where a frame does not solve
    async fn solve_each(&self, frames: &[FitsFrame]) -> Vec<Option<Wcs>> {
        let mut solutions = Vec::with_capacity(frames.len());
        for frame in frames {
            let wcs = match self.solver.solve(frame, false).await {
                Ok(wcs) => wcs,
                Err(e) => {
                    tracing::warn!("{}: {}", frame.name, e);
                    None
                }
            };
            solutions.push(wcs);
        }
        solutions
    }

    /// Color composite of three registered frames, asinh grayscale of one
    /// frame otherwise
    async fn compose(&self, frames: &[FitsFrame], solved: &Wcs) -> Result<image::RgbImage> {
        if frames.len() == 3 {
            let planes = frames.iter().map(cropped).collect::<Result<Vec<_>>>()?;
            let filters: Vec<&str> = frames.iter().map(|f| f.filter().unwrap_or("")).collect();
            let mut solutions = self.solve_each(frames).await;
            let reference = reference_layer(&filters);
            if solutions[reference].is_none() {
                solutions[reference] = Some(solved.clone());
            }

            match align_planes(planes, &filters, &solutions) {
                Some(aligned) => {
                    let layers: Vec<(&str, &ImagePlane)> = filters.iter().copied().zip(&aligned).collect();
                    match render::make_color_image(&layers) {
                        Ok(img) => return Ok(img),
                        Err(e) => tracing::warn!("Color composite failed ({}), using one frame", e),
                    }
                }
                None => tracing::warn!("Frames do not overlap, using one frame"),
            }
        }
        Ok(render::grayscale_image(&preview_plane(frames)?))
    }
}

/// `<name> (<magMax>)`, or the bare name when the magnitude is unknown
fn var_star_label(star: &VarStarRecord) -> String {
    match star.mag_max {
        Some(mag) => format!("{} ({:.1})", star.name, mag),
        None => star.name.clone(),
    }
}

/// Layer the others are registered onto: the one that becomes green
fn reference_layer(filters: &[&str]) -> usize {
    (0..filters.len()).max_by(|&a, &b| filters[a].cmp(filters[b])).unwrap_or(0)
}

/// Shift every plane onto the pixel grid of the reference layer using the
/// frames' plate solutions. Unsolved frames stay as they are. `None` when a
/// solved frame points more than half a field away from the reference.
fn align_planes(planes: Vec<ImagePlane>, filters: &[&str], solutions: &[Option<Wcs>]) -> Option<Vec<ImagePlane>> {
    let reference = reference_layer(filters);
    let Some(Some(ref_wcs)) = solutions.get(reference) else {
        return Some(planes);
    };
    let anchor = ref_wcs.center();
    let (ax, ay) = ref_wcs.sky_to_pixel(anchor.ra_deg, anchor.dec_deg)?;
    let max_offset = ref_wcs.pixel_scale_arcsec() * ref_wcs.width.max(ref_wcs.height) as f64 / 7200.0;

    planes
        .into_iter()
        .enumerate()
        .map(|(i, plane)| {
            let Some(Some(wcs)) = solutions.get(i) else {
                return Some(plane);
            };
            if i == reference {
                return Some(plane);
            }
            if wcs.center().separation(&anchor) > max_offset {
                return None;
            }
            let (x, y) = wcs.sky_to_pixel(anchor.ra_deg, anchor.dec_deg)?;
            let (dx, dy) = ((x - ax).round() as i64, (y - ay).round() as i64);
            if dx != 0 || dy != 0 {
                tracing::debug!("{}: shift {} {}", filters[i], dx, dy);
            }
            Some(plane.shifted(dx, dy))
        })
        .collect()
}

fn cropped(frame: &FitsFrame) -> Result<ImagePlane> {
    frame
        .image
        .as_ref()
        .map(|p| p.crop_overscan(OVERSCAN))
        .ok_or_else(|| ScopeError::NotFound(format!("image data in {}", frame.name)))
}

/// Frame used for single-frame previews: the second one when there are several
fn preview_plane(frames: &[FitsFrame]) -> Result<ImagePlane> {
    let index = frames.len().saturating_sub(1).min(1);
    let frame = frames
        .get(index)
        .ok_or_else(|| ScopeError::NotFound("frames to render".to_string()))?;
    cropped(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ComparisonStar, MockStarCatalog, Sequence};
    use crate::client::MockObservatory;
    use crate::fits::FitsHeader;
    use crate::solver::MockPlateSolver;
    use crate::types::RequestInfo;

    const JID: u64 = 654321;
    const RID: u64 = 123456;

    fn job() -> JobInfo {
        JobInfo {
            jid: JID,
            rid_text: Some("123456".to_string()),
            success: Some(true),
            ..Default::default()
        }
    }

    fn frames() -> Vec<FitsFrame> {
        ["B", "V", "R"]
            .iter()
            .map(|f| {
                let mut h = FitsHeader::new();
                h.insert("FILTER", *f);
                let plane = ImagePlane::new(64, 64, (0..64 * 64).map(|v| (v % 97) as f32).collect()).unwrap();
                FitsFrame::from_parts(&format!("{f}.fits"), h, Some(plane))
            })
            .collect()
    }

    fn frames_without_data() -> Vec<FitsFrame> {
        frames()
            .into_iter()
            .map(|f| FitsFrame::from_parts(&f.name, f.header.clone(), None))
            .collect()
    }

    fn wcs() -> Wcs {
        Wcs {
            crpix1: 31.5,
            crpix2: 31.5,
            crval1: 325.678,
            crval2: 43.586,
            cd1_1: -1.0 / 3600.0,
            cd1_2: 0.0,
            cd2_1: 0.0,
            cd2_2: 1.0 / 3600.0,
            width: 64,
            height: 64,
        }
    }

    fn star(name: &str) -> VarStarRecord {
        VarStarRecord {
            name: name.to_string(),
            position: SkyPosition::new(325.678, 43.586).unwrap(),
            mag_max: Some(7.7),
            var_type: Some("UGSS".to_string()),
        }
    }

    fn sequence() -> Sequence {
        Sequence {
            chart_id: "X1".to_string(),
            stars: vec![ComparisonStar {
                auid: "000-AAA-001".to_string(),
                label: "110".to_string(),
                position: SkyPosition::new(325.679, 43.587).unwrap(),
                bands: vec![],
            }],
        }
    }

    fn observatory() -> MockObservatory {
        observatory_with(frames)
    }

    fn observatory_with(frames: fn() -> Vec<FitsFrame>) -> MockObservatory {
        let mut obs = MockObservatory::new();
        obs.expect_job().returning(|_| Ok(job()));
        obs.expect_request().returning(|rid| {
            Ok(RequestInfo {
                rid,
                object_name: Some(" SS Cyg ".to_string()),
                ..Default::default()
            })
        });
        obs.expect_frames().returning(move |_| Ok(frames()));
        obs
    }

    async fn memory_db() -> Database {
        Database::connect_url("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_analyse_records_stars_and_marks_done() {
        let db = memory_db().await;
        let obs = observatory();

        let mut solver = MockPlateSolver::new();
        solver.expect_solve().times(1).returning(|_, _| Ok(Some(wcs())));

        let mut catalog = MockStarCatalog::new();
        catalog
            .expect_variable_stars_in()
            .returning(|_| Ok(vec![star("SS Cyg"), star("V686 Cyg")]));
        catalog
            .expect_comparison_sequence()
            .times(2)
            .returning(|name| Ok((name == "SS Cyg").then(sequence)));

        let pipeline = Pipeline::new(&obs, &solver, &catalog, &db);
        let outcome = pipeline.analyse_job(JID, None, false).await.unwrap();

        let AnalysisOutcome::Analysed(analysis) = outcome else {
            panic!("expected an analysis");
        };
        assert_eq!(analysis.rid, RID);
        assert_eq!(analysis.target, "SS Cyg");
        assert_eq!(analysis.filters, vec!["B", "V", "R"]);
        assert_eq!(analysis.stars.len(), 2);

        assert!(db.is_processed(JID).await.unwrap());
        assert_eq!(db.processed_job(JID).await.unwrap().unwrap().request_ids, vec![RID]);

        let ss = db.variable_star("SS Cyg").await.unwrap().unwrap();
        assert!(ss.jobs.contains(&JID));
        assert_eq!(ss.sequence, Some(sequence()));
        let v686 = db.variable_star("V686 Cyg").await.unwrap().unwrap();
        assert!(v686.sequence.is_none());
    }

    #[tokio::test]
    async fn test_known_sequence_not_refetched() {
        let db = memory_db().await;
        let mut known = VarStarEntry::new("SS Cyg");
        known.jobs.insert(1);
        known.sequence = Some(sequence());
        db.save_variable_star(&known).await.unwrap();

        let obs = observatory();
        let mut solver = MockPlateSolver::new();
        solver.expect_solve().returning(|_, _| Ok(Some(wcs())));
        let mut catalog = MockStarCatalog::new();
        catalog.expect_variable_stars_in().returning(|_| Ok(vec![star("SS Cyg")]));
        catalog.expect_comparison_sequence().times(0);

        let pipeline = Pipeline::new(&obs, &solver, &catalog, &db);
        pipeline.analyse_job(JID, Some(RID), false).await.unwrap();

        let ss = db.variable_star("SS Cyg").await.unwrap().unwrap();
        assert_eq!(ss.jobs.into_iter().collect::<Vec<_>>(), vec![1, JID]);
    }

    #[tokio::test]
    async fn test_processed_job_skipped() {
        let db = memory_db().await;
        db.mark_processed(JID, &[RID]).await.unwrap();

        let obs = observatory();
        let mut solver = MockPlateSolver::new();
        solver.expect_solve().times(0);
        let catalog = MockStarCatalog::new();

        let pipeline = Pipeline::new(&obs, &solver, &catalog, &db);
        let outcome = pipeline.analyse_job(JID, None, false).await.unwrap();
        assert!(matches!(outcome, AnalysisOutcome::AlreadyDone));
    }

    #[tokio::test]
    async fn test_unsolved_job_caches_cube() {
        let db = memory_db().await;
        let mut obs = observatory();
        obs.expect_cache_cube().times(1).returning(|_| Ok(()));

        let mut solver = MockPlateSolver::new();
        solver
            .expect_solve()
            .times(3)
            .returning(|_, _| Err(ScopeError::Solver("no pointing".to_string())));
        let catalog = MockStarCatalog::new();

        let pipeline = Pipeline::new(&obs, &solver, &catalog, &db);
        let outcome = pipeline.analyse_job(JID, None, false).await.unwrap();
        assert!(matches!(outcome, AnalysisOutcome::Unsolved));
        assert!(!db.is_processed(JID).await.unwrap());
    }

    #[tokio::test]
    async fn test_process_job_writes_preview() {
        let dir = tempfile::tempdir().unwrap();
        let db = memory_db().await;
        let obs = observatory();
        let mut solver = MockPlateSolver::new();
        solver.expect_solve().returning(|_, _| Ok(Some(wcs())));
        let mut catalog = MockStarCatalog::new();
        catalog.expect_variable_stars_in().returning(|_| Ok(vec![star("SS Cyg")]));
        catalog.expect_comparison_sequence().returning(|_| Ok(Some(sequence())));

        let pipeline = Pipeline::new(&obs, &solver, &catalog, &db).with_output_dir(dir.path());
        let outcome = pipeline.process_job(JID, false, None).await.unwrap();

        let ProcessOutcome::Rendered { preview, .. } = outcome else {
            panic!("expected a rendered preview");
        };
        assert!(preview.is_file());
        let img = image::open(&preview).unwrap();
        assert_eq!((img.width(), img.height()), (32, 32));
        assert!(db.is_processed(JID).await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_preview_leaves_job_unprocessed() {
        let dir = tempfile::tempdir().unwrap();
        let db = memory_db().await;
        let obs = observatory_with(frames_without_data);
        let mut solver = MockPlateSolver::new();
        solver.expect_solve().returning(|_, _| Ok(Some(wcs())));
        let mut catalog = MockStarCatalog::new();
        catalog.expect_variable_stars_in().returning(|_| Ok(vec![]));

        let pipeline = Pipeline::new(&obs, &solver, &catalog, &db).with_output_dir(dir.path());
        let err = pipeline.process_job(JID, false, None).await.unwrap_err();
        assert!(matches!(err, ScopeError::NotFound(_)));
        assert!(!db.is_processed(JID).await.unwrap());

        // a retry renders again instead of reporting the job as done
        let err = pipeline.process_job(JID, false, None).await.unwrap_err();
        assert!(matches!(err, ScopeError::NotFound(_)));
        assert!(!dir.path().join(format!("J{JID}.png")).exists());
    }

    #[tokio::test]
    async fn test_bad_pointing_falls_through_to_next_frame() {
        let db = memory_db().await;
        let obs = observatory();
        let mut solver = MockPlateSolver::new();
        solver
            .expect_solve()
            .withf(|frame, _| frame.name == "B.fits")
            .times(1)
            .returning(|_, _| Err(ScopeError::Solver("bad pointing OBJCTRA/OBJCTDEC".to_string())));
        solver
            .expect_solve()
            .withf(|frame, _| frame.name != "B.fits")
            .times(1)
            .returning(|_, _| Ok(Some(wcs())));
        let mut catalog = MockStarCatalog::new();
        catalog.expect_variable_stars_in().returning(|_| Ok(vec![]));

        let pipeline = Pipeline::new(&obs, &solver, &catalog, &db);
        let outcome = pipeline.analyse_job(JID, None, false).await.unwrap();
        assert!(matches!(outcome, AnalysisOutcome::Analysed(_)));
    }

    #[tokio::test]
    async fn test_markers_carry_labels_and_chart() {
        let db = memory_db().await;
        let mut entry = VarStarEntry::new("SS Cyg");
        entry.sequence = Some(sequence());
        db.save_variable_star(&entry).await.unwrap();

        let obs = observatory();
        let solver = MockPlateSolver::new();
        let catalog = MockStarCatalog::new();
        let pipeline = Pipeline::new(&obs, &solver, &catalog, &db);

        let mut faint = star("NSV_13763");
        faint.mag_max = None;
        let analysis = Analysis {
            jid: JID,
            rid: RID,
            target: "ss cyg".to_string(),
            completion: None,
            filters: vec!["V".to_string()],
            wcs: wcs(),
            stars: vec![star("SS Cyg"), faint],
        };
        let (markers, chart) = pipeline.markers(&analysis).await.unwrap();

        let labels: Vec<&str> = markers.iter().filter_map(|m| m.label.as_deref()).collect();
        assert_eq!(labels, vec!["SS Cyg (7.7)", "NSV_13763", "110"]);
        assert_eq!(markers[2].color, COMP_STAR_COLOR);
        assert_eq!(chart.as_deref(), Some("X1"));
    }

    fn ramp() -> ImagePlane {
        ImagePlane::new(64, 64, (0..64 * 64).map(|v| (v % 64) as f32).collect()).unwrap()
    }

    #[test]
    fn test_reference_layer_is_green() {
        assert_eq!(reference_layer(&["B", "V", "R"]), 1);
        assert_eq!(reference_layer(&["V", "R", "B"]), 0);
    }

    #[test]
    fn test_align_shifts_onto_reference() {
        let mut shifted = wcs();
        shifted.crpix1 += 3.0;
        let solutions = vec![Some(shifted), Some(wcs()), None];

        let aligned = align_planes(vec![ramp(), ramp(), ramp()], &["B", "V", "R"], &solutions).unwrap();
        assert_eq!(aligned[0].get(0, 0), 3.0);
        assert!(aligned[0].get(63, 0).is_nan());
        assert_eq!(aligned[1], ramp());
        assert_eq!(aligned[2], ramp());
    }

    #[test]
    fn test_align_rejects_frames_off_field() {
        let mut elsewhere = wcs();
        elsewhere.crval2 += 1.0;
        let solutions = vec![Some(elsewhere), Some(wcs()), Some(wcs())];
        assert!(align_planes(vec![ramp(), ramp(), ramp()], &["B", "V", "R"], &solutions).is_none());
    }

    #[test]
    fn test_align_without_reference_solution() {
        let solutions = vec![Some(wcs()), None, Some(wcs())];
        let planes = align_planes(vec![ramp(), ramp(), ramp()], &["B", "V", "R"], &solutions).unwrap();
        assert!(planes.iter().all(|p| *p == ramp()));
    }

    #[tokio::test]
    async fn test_process_job_layer_out_of_range() {
        let db = memory_db().await;
        let obs = observatory();
        let solver = MockPlateSolver::new();
        let catalog = MockStarCatalog::new();

        let pipeline = Pipeline::new(&obs, &solver, &catalog, &db);
        let err = pipeline.process_job(JID, false, Some(5)).await.unwrap_err();
        assert!(matches!(err, ScopeError::NotFound(_)));
    }
}
