use serde::{Deserialize, Serialize};

/// Platform roles, ordered from least to most privileged. Authorization
/// checks of the form "requires role X or higher" go through `rank` so the
/// ordering is defined in exactly one place.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Anonymous,
    Viewer,
    Reviewer,
    Admin,
}

impl Role {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "anonymous" | "guest" => Some(Role::Anonymous),
            "viewer" | "user" => Some(Role::Viewer),
            "reviewer" => Some(Role::Reviewer),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Anonymous => "anonymous",
            Role::Viewer => "viewer",
            Role::Reviewer => "reviewer",
            Role::Admin => "admin",
        }
    }

    pub fn rank(&self) -> u8 {
        match self {
            Role::Anonymous => 0,
            Role::Viewer => 1,
            Role::Reviewer => 2,
            Role::Admin => 3,
        }
    }

    pub fn at_least(&self, required: Role) -> bool {
        self.rank() >= required.rank()
    }

    pub fn can_review(&self) -> bool {
        self.at_least(Role::Reviewer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORDERED: [Role; 4] = [Role::Anonymous, Role::Viewer, Role::Reviewer, Role::Admin];

    #[test]
    fn rank_ordering_holds_for_every_pair() {
        for (i, lower) in ORDERED.iter().enumerate() {
            for (j, higher) in ORDERED.iter().enumerate() {
                assert_eq!(
                    lower.at_least(*higher),
                    i >= j,
                    "{} at_least {}",
                    lower.as_str(),
                    higher.as_str()
                );
            }
        }
    }

    #[test]
    fn parse_round_trips_canonical_names() {
        for role in ORDERED {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("user"), Some(Role::Viewer));
        assert_eq!(Role::parse("root"), None);
    }

    #[test]
    fn review_gate_matches_rank() {
        assert!(!Role::Viewer.can_review());
        assert!(Role::Reviewer.can_review());
        assert!(Role::Admin.can_review());
    }
}
