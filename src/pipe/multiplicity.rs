//! Multiplicity - how many items an input takes or an output yields
//!
//! `None` means exactly one. `Flag(true)` means many with an engine-decided
//! count, `Flag(false)` explicitly single, `Count(n)` exactly `n`.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Multiplicity {
    Flag(bool),
    Count(i64),
}

impl Multiplicity {
    pub fn is_multiple(&self) -> bool {
        match self {
            Self::Flag(flag) => *flag,
            Self::Count(_) => true,
        }
    }

    pub fn count(&self) -> Option<i64> {
        match self {
            Self::Count(n) => Some(*n),
            Self::Flag(_) => None,
        }
    }
}

impl fmt::Display for Multiplicity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flag(true) => f.write_str("[]"),
            Self::Flag(false) => f.write_str("single"),
            Self::Count(n) => write!(f, "[{n}]"),
        }
    }
}

/// Multiplicity from the two optional declarations.
///
/// A nonzero `nb_items` wins (negative included); otherwise
/// `multiple_items = true` means many; otherwise single.
pub fn make_variable_multiplicity(
    nb_items: Option<i64>,
    multiple_items: Option<bool>,
) -> Option<Multiplicity> {
    match (nb_items, multiple_items) {
        (Some(n), _) if n != 0 => Some(Multiplicity::Count(n)),
        (_, Some(true)) => Some(Multiplicity::Flag(true)),
        _ => None,
    }
}

/// Outcome of combining a pipe's output multiplicity with a caller override
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OutputMultiplicityResolution {
    pub resolved: Option<Multiplicity>,
    pub is_multiple_enabled: bool,
    pub specific_count: Option<i64>,
}

impl OutputMultiplicityResolution {
    fn from_base(base: Option<Multiplicity>) -> Self {
        match base {
            None => Self {
                resolved: None,
                is_multiple_enabled: false,
                specific_count: None,
            },
            Some(m) => Self {
                resolved: Some(m),
                is_multiple_enabled: m.is_multiple(),
                specific_count: m.count(),
            },
        }
    }
}

/// Resolve the multiplicity to apply to a pipe's output.
///
/// - override `false`: single, whatever the base says
/// - override `N`: exactly N
/// - override `true`: the base count if it has one, else undetermined many
/// - no override: the base's own meaning
pub fn output_multiplicity_to_apply(
    base: Option<Multiplicity>,
    override_multiplicity: Option<Multiplicity>,
) -> OutputMultiplicityResolution {
    match override_multiplicity {
        None => OutputMultiplicityResolution::from_base(base),
        Some(Multiplicity::Flag(false)) => OutputMultiplicityResolution {
            resolved: Some(Multiplicity::Flag(false)),
            is_multiple_enabled: false,
            specific_count: None,
        },
        Some(Multiplicity::Count(n)) => OutputMultiplicityResolution {
            resolved: Some(Multiplicity::Count(n)),
            is_multiple_enabled: true,
            specific_count: Some(n),
        },
        Some(Multiplicity::Flag(true)) => match base {
            Some(Multiplicity::Count(n)) => OutputMultiplicityResolution {
                resolved: Some(Multiplicity::Count(n)),
                is_multiple_enabled: true,
                specific_count: Some(n),
            },
            _ => OutputMultiplicityResolution {
                resolved: Some(Multiplicity::Flag(true)),
                is_multiple_enabled: true,
                specific_count: None,
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use Multiplicity::{Count, Flag};

    #[test]
    fn variable_multiplicity_rules() {
        assert_eq!(make_variable_multiplicity(Some(3), Some(false)), Some(Count(3)));
        assert_eq!(make_variable_multiplicity(Some(-2), None), Some(Count(-2)));
        assert_eq!(make_variable_multiplicity(Some(0), Some(true)), Some(Flag(true)));
        assert_eq!(make_variable_multiplicity(None, Some(true)), Some(Flag(true)));
        assert_eq!(make_variable_multiplicity(Some(0), Some(false)), None);
        assert_eq!(make_variable_multiplicity(None, None), None);
    }

    #[test]
    fn count_base_with_true_override_keeps_count() {
        let r = output_multiplicity_to_apply(Some(Count(3)), Some(Flag(true)));
        assert_eq!(r.resolved, Some(Count(3)));
        assert!(r.is_multiple_enabled);
        assert_eq!(r.specific_count, Some(3));
    }

    #[test]
    fn false_override_wins_over_many_base() {
        let r = output_multiplicity_to_apply(Some(Flag(true)), Some(Flag(false)));
        assert_eq!(r.resolved, Some(Flag(false)));
        assert!(!r.is_multiple_enabled);
        assert_eq!(r.specific_count, None);
    }

    #[test]
    fn no_override_keeps_base_meaning() {
        let single = output_multiplicity_to_apply(None, None);
        assert!(!single.is_multiple_enabled);
        let explicit_single = output_multiplicity_to_apply(Some(Flag(false)), None);
        assert!(!explicit_single.is_multiple_enabled);
        let many = output_multiplicity_to_apply(Some(Flag(true)), None);
        assert!(many.is_multiple_enabled);
        assert_eq!(many.specific_count, None);
        let exact = output_multiplicity_to_apply(Some(Count(5)), None);
        assert_eq!(exact.specific_count, Some(5));
    }

    #[test]
    fn serde_untagged_forms() {
        assert_eq!(serde_json::from_str::<Multiplicity>("true").unwrap(), Flag(true));
        assert_eq!(serde_json::from_str::<Multiplicity>("4").unwrap(), Count(4));
    }

    fn any_multiplicity() -> impl Strategy<Value = Option<Multiplicity>> {
        prop_oneof![
            Just(None),
            any::<bool>().prop_map(|b| Some(Flag(b))),
            (-5i64..50).prop_map(|n| Some(Count(n))),
        ]
    }

    proptest! {
        #[test]
        fn int_override_always_wins(base in any_multiplicity(), n in -5i64..50) {
            let r = output_multiplicity_to_apply(base, Some(Count(n)));
            prop_assert_eq!(r.resolved, Some(Count(n)));
            prop_assert!(r.is_multiple_enabled);
            prop_assert_eq!(r.specific_count, Some(n));
        }

        #[test]
        fn false_override_always_single(base in any_multiplicity()) {
            let r = output_multiplicity_to_apply(base, Some(Flag(false)));
            prop_assert!(!r.is_multiple_enabled);
            prop_assert_eq!(r.specific_count, None);
        }

        #[test]
        fn count_is_set_only_when_multiple(base in any_multiplicity(), over in any_multiplicity()) {
            let r = output_multiplicity_to_apply(base, over);
            if r.specific_count.is_some() {
                prop_assert!(r.is_multiple_enabled);
            }
        }
    }
}
