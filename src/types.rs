use nalgebra::{Point3, Vector2, Vector3};
use serde::{Deserialize, Serialize};

use crate::geometry::NdcZPoint;
use crate::mesh::FaceRef;

/// Geometric origin of an extracted line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LineType {
    Silhouette,
    BackfacingSilhouette,
    Border,
    Crease,
    WayPath,
    Polyline,
}

/// Per-point visibility code.
///
/// `Visible`/`Hidden`/`Occluded` are the raster-resolved states; `Backfacing`
/// and `OutOfFrustum` are resolved upstream and never reach the raster.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Visibility {
    Visible,
    Hidden,
    Occluded,
    Backfacing,
    OutOfFrustum,
}

impl Visibility {
    /// Index into per-(type, visibility) tables; only the raster-resolved
    /// states are table-addressable.
    pub fn channel(self) -> Option<usize> {
        match self {
            Visibility::Visible => Some(0),
            Visibility::Hidden => Some(1),
            Visibility::Occluded => Some(2),
            _ => None,
        }
    }
}

/// How visibility is resolved against the ID raster.
///
/// `SingleChannel` trusts the facing test and only re-confirms visible
/// points against the raster. `DualChannel` writes hidden geometry under a
/// second id family and classifies every point by read-back, so hidden
/// lines can be drawn styled instead of dropped.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum VisibilityMode {
    SingleChannel,
    #[default]
    DualChannel,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoteStatus {
    #[default]
    Good,
    Outlier,
    /// Synthesized during healing, not propagated from a sample.
    Healer,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroupStatus {
    #[default]
    Good,
    LowLength,
    LowVotes,
    BadDensity,
    SplitLoop,
    SplitLargeDelta,
    SplitGap,
    CullBackwards,
    SplitAllBacktrack,
    FitBackwards,
    FinalFitBackwards,
    NotMajority,
    NotOneToOne,
    NotHybrid,
    Healed,
}

impl GroupStatus {
    pub fn is_good(self) -> bool {
        self == GroupStatus::Good
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FitStatus {
    Good,
    #[default]
    None,
    Backwards,
    /// Votes changed since the fit table was built.
    Stale,
}

/// One parameter vote cast by a propagated sample onto a new-frame path.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ParamVote {
    /// Arc length of the hit point on the receiving path.
    pub s: f64,
    /// Parameter value carried over from the previous frame.
    pub t: f64,
    pub confidence: f64,
    pub status: VoteStatus,
    /// Index of the path the sample matched on the previous frame.
    pub path_index: usize,
    /// Stroke (vote-group) id the sample represents.
    pub stroke_id: u32,
    /// Screen distance from the reprojected sample to the hit, in pixels.
    pub pix_dist: f64,
    /// World travel of the underlying surface point between the vote's
    /// endpoints, normalized by the mesh's average edge size in pixels.
    pub world_dist: f64,
}

/// Cross-frame seed: a surface point with the stroke parameter it carried,
/// regenerated from group fits at the end of each frame and matched afresh
/// on the next.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct PathSample {
    pub stroke_id: u32,
    /// Screen position at generation time (diagnostics only; the world
    /// position is what gets reprojected).
    pub pos: NdcZPoint,
    /// Search direction at generation time (path normal at the sample);
    /// the march rederives it from the current surface normal.
    pub dir: Vector2<f64>,
    pub t: f64,
    pub face: Option<FaceRef>,
    pub bary: Vector3<f64>,
    /// Object-space position at generation time; the march rederives it
    /// from the face attachment, so a stale face expires the sample.
    pub world: Point3<f64>,
    pub line_type: LineType,
    pub vis: Visibility,
    pub path_index: usize,
}

/// One point of an emitted stroke span.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct SpanPoint {
    pub pos: NdcZPoint,
    /// Fitted stroke parameter at this point.
    pub t: f64,
    /// Arc length along the source path.
    pub s: f64,
}

/// A renderable stretch of one tracked stroke: the consumable output of a
/// frame, sampled from a fitted vote group.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StrokeSpan {
    pub stroke_id: u32,
    pub path_index: usize,
    pub line_type: LineType,
    pub vis: Visibility,
    pub points: Vec<SpanPoint>,
}
