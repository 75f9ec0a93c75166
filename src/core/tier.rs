//! Aggregation tiers and their window lengths.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the three aggregation levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Shortest window, summarized directly from captured evidence
    Base,
    /// Rolls up Base records
    Mid,
    /// Rolls up Mid records
    Top,
}

impl Tier {
    /// All tiers, leaf first.
    pub const ALL: [Tier; 3] = [Tier::Base, Tier::Mid, Tier::Top];

    /// The tier whose records feed this one.
    pub fn child(self) -> Option<Tier> {
        match self {
            Tier::Base => None,
            Tier::Mid => Some(Tier::Base),
            Tier::Top => Some(Tier::Mid),
        }
    }

    /// The tier this one feeds.
    pub fn parent(self) -> Option<Tier> {
        match self {
            Tier::Base => Some(Tier::Mid),
            Tier::Mid => Some(Tier::Top),
            Tier::Top => None,
        }
    }

    /// Lowercase name used in file paths and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Base => "base",
            Tier::Mid => "mid",
            Tier::Top => "top",
        }
    }

    /// Position in [`Tier::ALL`].
    pub fn index(self) -> usize {
        match self {
            Tier::Base => 0,
            Tier::Mid => 1,
            Tier::Top => 2,
        }
    }

    /// Parse a tier name (case-insensitive).
    pub fn from_name(name: &str) -> Option<Tier> {
        match name.trim().to_lowercase().as_str() {
            "base" => Some(Tier::Base),
            "mid" => Some(Tier::Mid),
            "top" => Some(Tier::Top),
            _ => None,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Window lengths for all three tiers, in minutes.
///
/// Each tier ticks at an interval equal to its window length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierWindows {
    pub base_minutes: u32,
    pub mid_minutes: u32,
    pub top_minutes: u32,
}

impl Default for TierWindows {
    fn default() -> Self {
        Self {
            base_minutes: 2,
            mid_minutes: 10,
            top_minutes: 60,
        }
    }
}

impl TierWindows {
    /// Window length of a tier in minutes.
    pub fn minutes(&self, tier: Tier) -> u32 {
        match tier {
            Tier::Base => self.base_minutes,
            Tier::Mid => self.mid_minutes,
            Tier::Top => self.top_minutes,
        }
    }

    /// Window length of a tier as a chrono duration.
    pub fn duration(&self, tier: Tier) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.minutes(tier)))
    }

    /// Number of child windows that make up one window of `tier`.
    ///
    /// Returns 0 for the Base tier, which has no children.
    pub fn children_per_window(&self, tier: Tier) -> usize {
        match tier.child() {
            Some(child) => {
                let child_minutes = self.minutes(child);
                if child_minutes == 0 {
                    0
                } else {
                    (self.minutes(tier) / child_minutes) as usize
                }
            }
            None => 0,
        }
    }

    /// Check that no window is empty and each parent is an exact multiple of its child.
    pub fn check(&self) -> Result<(), String> {
        for tier in Tier::ALL {
            if self.minutes(tier) == 0 {
                return Err(format!("{tier} window must be at least one minute"));
            }
        }
        for tier in [Tier::Mid, Tier::Top] {
            if let Some(child) = tier.child() {
                if self.minutes(tier) % self.minutes(child) != 0 {
                    return Err(format!(
                        "{tier} window ({}m) is not a multiple of the {child} window ({}m)",
                        self.minutes(tier),
                        self.minutes(child)
                    ));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_relationships() {
        assert_eq!(Tier::Base.child(), None);
        assert_eq!(Tier::Mid.child(), Some(Tier::Base));
        assert_eq!(Tier::Top.parent(), None);
        assert_eq!(Tier::from_name(" MID "), Some(Tier::Mid));
        assert_eq!(Tier::from_name("hourly"), None);
    }

    #[test]
    fn test_default_windows() {
        let windows = TierWindows::default();
        assert_eq!(windows.children_per_window(Tier::Mid), 5);
        assert_eq!(windows.children_per_window(Tier::Top), 6);
        assert_eq!(windows.children_per_window(Tier::Base), 0);
        assert!(windows.check().is_ok());
    }

    #[test]
    fn test_windows_must_nest() {
        let windows = TierWindows {
            base_minutes: 3,
            mid_minutes: 10,
            top_minutes: 60,
        };
        assert!(windows.check().is_err());

        let windows = TierWindows {
            base_minutes: 0,
            ..TierWindows::default()
        };
        assert!(windows.check().is_err());
    }
}
