//! Enum types for Tidewatch entities

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

fn normalize_token(s: &str) -> String {
    s.trim()
        .chars()
        .filter(|c| !matches!(c, '-' | '_' | ' '))
        .flat_map(char::to_lowercase)
        .collect()
}

// ============================================================================
// TIER
// ============================================================================

/// Entity kind in the monitoring hierarchy.
///
/// `Project → Point → Deployment → Audio` form the ownership tree. `Recorder`
/// sits outside it and is only referenced by deployments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum Tier {
    Project,
    Point,
    Deployment,
    Audio,
    Recorder,
}

impl Tier {
    /// Tree tiers ordered root first.
    pub const TREE: [Tier; 4] = [Tier::Project, Tier::Point, Tier::Deployment, Tier::Audio];

    /// Every tier, tree first then the registry.
    pub const ALL: [Tier; 5] = [
        Tier::Project,
        Tier::Point,
        Tier::Deployment,
        Tier::Audio,
        Tier::Recorder,
    ];

    /// Owning tier, if any.
    pub fn parent(self) -> Option<Tier> {
        match self {
            Tier::Point => Some(Tier::Project),
            Tier::Deployment => Some(Tier::Point),
            Tier::Audio => Some(Tier::Deployment),
            Tier::Project | Tier::Recorder => None,
        }
    }

    /// Descendant tiers ordered nearest first.
    pub fn descendants(self) -> &'static [Tier] {
        match self {
            Tier::Project => &Tier::TREE[1..],
            Tier::Point => &Tier::TREE[2..],
            Tier::Deployment => &Tier::TREE[3..],
            Tier::Audio | Tier::Recorder => &[],
        }
    }

    /// Whether `self` lies strictly below `ancestor` in the tree.
    pub fn is_below(self, ancestor: Tier) -> bool {
        ancestor.descendants().contains(&self)
    }

    /// Depth in the tree; the registry has no depth.
    pub fn depth(self) -> Option<usize> {
        Tier::TREE.iter().position(|t| *t == self)
    }

    /// Relational table backing this tier.
    pub fn table_name(self) -> &'static str {
        match self {
            Tier::Project => "project_info",
            Tier::Point => "point_info",
            Tier::Deployment => "deployment_info",
            Tier::Audio => "audio_info",
            Tier::Recorder => "recorder_info",
        }
    }

    /// Column in this tier's table that references the parent row.
    pub fn parent_column(self) -> Option<&'static str> {
        match self {
            Tier::Point => Some("project_id"),
            Tier::Deployment => Some("point_id"),
            Tier::Audio => Some("deployment_id"),
            Tier::Project | Tier::Recorder => None,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            Tier::Project => "Project",
            Tier::Point => "Point",
            Tier::Deployment => "Deployment",
            Tier::Audio => "Audio",
            Tier::Recorder => "Recorder",
        };
        write!(f, "{}", value)
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "project" => Ok(Tier::Project),
            "point" => Ok(Tier::Point),
            "deployment" => Ok(Tier::Deployment),
            "audio" => Ok(Tier::Audio),
            "recorder" => Ok(Tier::Recorder),
            _ => Err(format!("Invalid Tier: {}", s)),
        }
    }
}

// ============================================================================
// STATUS ENUMS
// ============================================================================

/// Field status of a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum DeploymentStatus {
    #[default]
    Undeployed,
    Monitoring,
    Success,
    WaterIntrusion,
    Lost,
}

impl DeploymentStatus {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            DeploymentStatus::Undeployed => "un-deployed",
            DeploymentStatus::Monitoring => "under-monitoring",
            DeploymentStatus::Success => "success",
            DeploymentStatus::WaterIntrusion => "water-intrusion",
            DeploymentStatus::Lost => "lost",
        }
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db_str())
    }
}

impl FromStr for DeploymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "undeployed" => Ok(DeploymentStatus::Undeployed),
            "undermonitoring" | "monitoring" => Ok(DeploymentStatus::Monitoring),
            "success" => Ok(DeploymentStatus::Success),
            "waterintrusion" => Ok(DeploymentStatus::WaterIntrusion),
            "lost" => Ok(DeploymentStatus::Lost),
            _ => Err(format!("Invalid DeploymentStatus: {}", s)),
        }
    }
}

/// Service status of a recorder unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum RecorderStatus {
    #[default]
    InService,
    OutOfService,
    UnderRepair,
    UnderCalibration,
    Broken,
    Retired,
    Lost,
    CheckedOut,
}

impl RecorderStatus {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            RecorderStatus::InService => "in-service",
            RecorderStatus::OutOfService => "out-of-service",
            RecorderStatus::UnderRepair => "under-repair",
            RecorderStatus::UnderCalibration => "under-calibration",
            RecorderStatus::Broken => "broken",
            RecorderStatus::Retired => "retired",
            RecorderStatus::Lost => "lost",
            RecorderStatus::CheckedOut => "checked-out",
        }
    }
}

impl fmt::Display for RecorderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db_str())
    }
}

impl FromStr for RecorderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "inservice" => Ok(RecorderStatus::InService),
            "outofservice" => Ok(RecorderStatus::OutOfService),
            "underrepair" => Ok(RecorderStatus::UnderRepair),
            "undercalibration" => Ok(RecorderStatus::UnderCalibration),
            "broken" => Ok(RecorderStatus::Broken),
            "retired" => Ok(RecorderStatus::Retired),
            "lost" => Ok(RecorderStatus::Lost),
            "checkedout" => Ok(RecorderStatus::CheckedOut),
            _ => Err(format!("Invalid RecorderStatus: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descendants_are_nearest_first() {
        assert_eq!(
            Tier::Project.descendants(),
            &[Tier::Point, Tier::Deployment, Tier::Audio]
        );
        assert_eq!(Tier::Point.descendants(), &[Tier::Deployment, Tier::Audio]);
        assert_eq!(Tier::Deployment.descendants(), &[Tier::Audio]);
        assert!(Tier::Audio.descendants().is_empty());
        assert!(Tier::Recorder.descendants().is_empty());
    }

    #[test]
    fn test_parent_chain_matches_descendants() {
        for tier in Tier::TREE {
            for below in tier.descendants() {
                assert!(below.is_below(tier));
                assert!(!tier.is_below(*below));
            }
        }
        assert_eq!(Tier::Audio.parent(), Some(Tier::Deployment));
        assert_eq!(Tier::Recorder.parent(), None);
        assert_eq!(Tier::Recorder.depth(), None);
    }

    #[test]
    fn test_tier_from_str() {
        assert_eq!("project".parse::<Tier>(), Ok(Tier::Project));
        assert_eq!(" Audio ".parse::<Tier>(), Ok(Tier::Audio));
        assert!("detection".parse::<Tier>().is_err());
    }

    #[test]
    fn test_status_db_strings_round_trip() {
        assert_eq!(DeploymentStatus::default().as_db_str(), "un-deployed");
        assert_eq!(
            "water-intrusion".parse::<DeploymentStatus>(),
            Ok(DeploymentStatus::WaterIntrusion)
        );
        assert_eq!(RecorderStatus::default().as_db_str(), "in-service");
        assert_eq!(
            "checked-out".parse::<RecorderStatus>(),
            Ok(RecorderStatus::CheckedOut)
        );
    }
}
