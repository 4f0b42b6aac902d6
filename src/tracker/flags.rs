use serde::{Deserialize, Serialize};

use crate::types::{LineType, Visibility, VisibilityMode};

/// Per-visibility enables for one line type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VisFlags {
    pub visible: bool,
    pub hidden: bool,
    pub occluded: bool,
}

impl VisFlags {
    pub const VISIBLE_ONLY: VisFlags = VisFlags {
        visible: true,
        hidden: false,
        occluded: false,
    };

    fn any(&self) -> bool {
        self.visible || self.hidden || self.occluded
    }

    fn get(&self, vis: Visibility) -> bool {
        match vis.channel() {
            Some(0) => self.visible,
            Some(1) => self.hidden,
            Some(2) => self.occluded,
            _ => false,
        }
    }
}

/// Which line type and visibility combinations the pipeline carries
/// through rasterization and stroke output.
///
/// Way paths and polylines share the silhouette row: they are styled and
/// gated as silhouettes even though they track under their own types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RenderFlags {
    pub silhouette: VisFlags,
    pub backfacing_silhouette: VisFlags,
    pub border: VisFlags,
    pub crease: VisFlags,
}

impl Default for RenderFlags {
    fn default() -> Self {
        Self {
            silhouette: VisFlags::VISIBLE_ONLY,
            backfacing_silhouette: VisFlags::default(),
            border: VisFlags::default(),
            crease: VisFlags::default(),
        }
    }
}

impl RenderFlags {
    fn row(&self, line_type: LineType) -> &VisFlags {
        match line_type {
            LineType::Silhouette | LineType::WayPath | LineType::Polyline => &self.silhouette,
            LineType::BackfacingSilhouette => &self.backfacing_silhouette,
            LineType::Border => &self.border,
            LineType::Crease => &self.crease,
        }
    }

    pub fn row_mut(&mut self, line_type: LineType) -> &mut VisFlags {
        match line_type {
            LineType::Silhouette | LineType::WayPath | LineType::Polyline => &mut self.silhouette,
            LineType::BackfacingSilhouette => &mut self.backfacing_silhouette,
            LineType::Border => &mut self.border,
            LineType::Crease => &mut self.crease,
        }
    }

    pub fn get(&self, line_type: LineType, vis: Visibility) -> bool {
        self.row(line_type).get(vis)
    }

    /// Any visibility of this type enabled at all.
    pub fn type_enabled(&self, line_type: LineType) -> bool {
        self.row(line_type).any()
    }

    fn type_visible_only(&self, line_type: LineType) -> bool {
        *self.row(line_type) == VisFlags::VISIBLE_ONLY
    }

    /// Should this type rasterize into the hidden channel. Only the
    /// dual-channel pipeline has one.
    pub fn draws_hidden_channel(&self, line_type: LineType, mode: VisibilityMode) -> bool {
        mode == VisibilityMode::DualChannel
            && self.type_enabled(line_type)
            && !self.type_visible_only(line_type)
    }

    /// Should this type rasterize into the visible channel. Backfacing
    /// silhouettes never do: at the surface they coincide with the true
    /// silhouette and would corrupt its ids.
    pub fn draws_visible_channel(&self, line_type: LineType, mode: VisibilityMode) -> bool {
        if line_type == LineType::BackfacingSilhouette {
            return false;
        }
        match mode {
            VisibilityMode::DualChannel => self.type_enabled(line_type),
            VisibilityMode::SingleChannel => self.get(line_type, Visibility::Visible),
        }
    }

    /// Final gate for emitting strokes of this type and visibility.
    pub fn renders(&self, line_type: LineType, vis: Visibility, mode: VisibilityMode) -> bool {
        match mode {
            VisibilityMode::DualChannel => self.get(line_type, vis),
            VisibilityMode::SingleChannel => {
                line_type != LineType::BackfacingSilhouette
                    && vis == Visibility::Visible
                    && self.get(line_type, vis)
            }
        }
    }
}
