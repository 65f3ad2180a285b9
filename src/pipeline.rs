//! End-to-end batch run.
//!
//! Stages run strictly in order and each consumes the previous stage's output
//! without modifying it:
//! ingest -> network -> ride mapping -> weights -> global/local Moran ->
//! hotspots -> scoring. Diagnostics from every stage are collected into the
//! report.

use std::time::Instant;

use geo::{Intersects, MapCoords, MultiPolygon};
use log::info;
use serde::{Deserialize, Serialize};

use crate::config::{AnalysisConfig, TrafficThresholds};
use crate::diagnostics::{Diagnostic, DiagnosticKind, Stage};
use crate::error::Result;
use crate::export::{candidates_to_features, segments_to_features, FeatureCollection, NetworkSummary};
use crate::geo_utils::LocalProjection;
use crate::ingest::{ingest_tracks, CoordinateSystem, TrackCollection};
use crate::mapping::{map_rides, MappingReport};
use crate::network::{build_network, BuildStrategy, NetworkSegment};
use crate::sites::{find_candidates, score_candidates, ExclusionZone, HotspotOutcome, RankedCandidate};
use crate::stats::{
    annotate_segments, global_morans_i, local_morans_i, Degeneracy, GlobalMoranResult, SpatialWeights,
};

/// Attribute tested for spatial autocorrelation.
pub const USAGE_ATTRIBUTE: &str = "ride_count";

/// A zone polygon in the same coordinate system as the tracks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneInput {
    pub zone_type: String,
    pub geometry: MultiPolygon<f64>,
}

/// Everything a run needs besides configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineInput {
    pub tracks: TrackCollection,
    /// Exclusion zones; None means no zone data
    pub zones: Option<Vec<ZoneInput>>,
    /// Tracks not touching this area are ignored
    pub study_area: Option<MultiPolygon<f64>>,
}

impl PipelineInput {
    pub fn new(tracks: TrackCollection) -> Self {
        Self {
            tracks,
            zones: None,
            study_area: None,
        }
    }

    pub fn with_zones(mut self, zones: Vec<ZoneInput>) -> Self {
        self.zones = Some(zones);
        self
    }

    pub fn with_study_area(mut self, area: MultiPolygon<f64>) -> Self {
        self.study_area = Some(area);
        self
    }
}

/// All outputs of a run.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub projection: Option<LocalProjection>,
    /// Tracks that entered network construction
    pub track_count: usize,
    pub strategy: BuildStrategy,
    /// Mapped segments carrying LISA attributes
    pub segments: Vec<NetworkSegment>,
    pub mapping: MappingReport,
    pub global_moran: GlobalMoranResult,
    pub lisa_degeneracy: Option<Degeneracy>,
    pub hotspots: HotspotOutcome,
    /// Sorted by rank
    pub candidates: Vec<RankedCandidate>,
    pub summary: NetworkSummary,
    pub diagnostics: Vec<Diagnostic>,
    traffic: TrafficThresholds,
}

impl PipelineReport {
    pub fn segment_features(&self) -> FeatureCollection {
        segments_to_features(&self.segments, self.projection.as_ref(), &self.traffic)
    }

    pub fn candidate_features(&self) -> FeatureCollection {
        candidates_to_features(&self.candidates, self.projection.as_ref())
    }

    pub fn has_diagnostic(&self, kind: DiagnosticKind) -> bool {
        self.diagnostics.iter().any(|d| d.kind == kind)
    }
}

fn to_analysis_frame(
    geometry: &MultiPolygon<f64>,
    crs: CoordinateSystem,
    projection: Option<&LocalProjection>,
) -> MultiPolygon<f64> {
    match (crs, projection) {
        (CoordinateSystem::Geographic, Some(p)) => geometry.map_coords(|c| p.project_lng_lat(c)),
        _ => geometry.clone(),
    }
}

/// Run every stage on `input`.
pub fn run_pipeline(input: &PipelineInput, config: &AnalysisConfig) -> Result<PipelineReport> {
    config.validate()?;
    let start = Instant::now();
    let crs = input.tracks.crs;

    // Ingest
    let ingested = ingest_tracks(&input.tracks, &config.ingest)?;
    let projection = ingested.projection;
    let mut diagnostics = ingested.diagnostics;
    let mut tracks = ingested.tracks;

    if let Some(area) = &input.study_area {
        let area = to_analysis_frame(area, crs, projection.as_ref());
        let before = tracks.len();
        tracks.retain(|t| area.0.iter().any(|poly| t.geometry.intersects(poly)));
        let outside = before - tracks.len();
        if outside > 0 {
            diagnostics.push(Diagnostic::new(
                Stage::Ingest,
                DiagnosticKind::DroppedTracks,
                format!("{outside} tracks outside the study area"),
            ));
        }
    }

    // Network
    let build = build_network(&tracks, &config.network)?;
    diagnostics.extend(build.diagnostics.iter().cloned());

    // Mapping
    let (mapped, mapping) = map_rides(&build, &tracks, &config.mapping)?;
    diagnostics.extend(mapping.diagnostics.iter().cloned());

    // Spatial statistics
    let weights = SpatialWeights::for_segments(&mapped, &config.spatial)?;
    let values: Vec<f64> = mapped.iter().map(|s| s.ride_count as f64).collect();
    let global_moran = global_morans_i(USAGE_ATTRIBUTE, &values, &weights, &config.spatial)?;
    if let Some(reason) = &global_moran.degeneracy {
        diagnostics.push(Diagnostic::new(
            Stage::Spatial,
            DiagnosticKind::DegenerateStatistic,
            format!("Moran's I of {USAGE_ATTRIBUTE} not computed: {reason:?}"),
        ));
    }
    let lisa = local_morans_i(USAGE_ATTRIBUTE, &values, &weights, &config.spatial)?;
    let segments = annotate_segments(&mapped, &lisa)?;

    // Hotspots
    let hotspots = find_candidates(&segments, &config.hotspots)?;
    if let HotspotOutcome::NoHotspots {
        high_high_segments,
        eligible_segments,
    } = &hotspots
    {
        diagnostics.push(Diagnostic::new(
            Stage::Hotspots,
            DiagnosticKind::NoHotspots,
            format!(
                "no candidate sites: {high_high_segments} High-High segments, {eligible_segments} above the traffic floor"
            ),
        ));
    }
    for candidate in hotspots.candidates().iter().filter(|c| c.centroid_fallback) {
        diagnostics.push(Diagnostic::new(
            Stage::Hotspots,
            DiagnosticKind::WeightedCentroidFallback,
            format!("candidate {} placed at the unweighted centroid", candidate.id),
        ));
    }

    // Scoring
    let zones: Option<Vec<ExclusionZone>> = input.zones.as_ref().map(|zones| {
        zones
            .iter()
            .map(|z| ExclusionZone {
                zone_type: z.zone_type.clone(),
                geometry: to_analysis_frame(&z.geometry, crs, projection.as_ref()),
            })
            .collect()
    });
    let scored = score_candidates(hotspots.candidates(), &segments, zones.as_deref(), &config.scoring)?;
    diagnostics.extend(scored.diagnostics);

    let summary = NetworkSummary::from_segments(&segments, &config.traffic);
    info!(
        "[Pipeline] {} tracks -> {} segments -> {} candidates ({} diagnostics) in {}ms",
        tracks.len(),
        segments.len(),
        scored.ranked.len(),
        diagnostics.len(),
        start.elapsed().as_millis()
    );

    Ok(PipelineReport {
        projection,
        track_count: tracks.len(),
        strategy: build.strategy,
        segments,
        mapping,
        global_moran,
        lisa_degeneracy: lisa.degeneracy,
        hotspots,
        candidates: scored.ranked,
        summary,
        diagnostics,
        traffic: config.traffic,
    })
}
