//! Degree-of-success computation shared by checks, saves, and strikes.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Degree {
    CriticalSuccess,
    Success,
    Failure,
    CriticalFailure,
}

impl Degree {
    fn bump_up(self) -> Self {
        match self {
            Degree::CriticalFailure => Degree::Failure,
            Degree::Failure => Degree::Success,
            Degree::Success | Degree::CriticalSuccess => Degree::CriticalSuccess,
        }
    }

    fn bump_down(self) -> Self {
        match self {
            Degree::CriticalSuccess => Degree::Success,
            Degree::Success => Degree::Failure,
            Degree::Failure | Degree::CriticalFailure => Degree::CriticalFailure,
        }
    }
}

/// `total` vs `dc`, bumped one step by a natural 20 or natural 1 on the die.
pub fn degree_of_success(total: i64, dc: i64, die_value: i64) -> Degree {
    let mut degree = if total >= dc + 10 {
        Degree::CriticalSuccess
    } else if total >= dc {
        Degree::Success
    } else if total <= dc - 10 {
        Degree::CriticalFailure
    } else {
        Degree::Failure
    };

    if die_value == 20 {
        degree = degree.bump_up();
    } else if die_value == 1 {
        degree = degree.bump_down();
    }
    degree
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_thresholds() {
        assert_eq!(degree_of_success(25, 15, 10), Degree::CriticalSuccess);
        assert_eq!(degree_of_success(15, 15, 10), Degree::Success);
        assert_eq!(degree_of_success(14, 15, 10), Degree::Failure);
        assert_eq!(degree_of_success(4, 15, 10), Degree::CriticalFailure);
    }

    #[test]
    fn natural_20_bumps_up() {
        // Would be critical_failure on totals alone, but die is 20.
        assert_eq!(degree_of_success(1, 30, 20), Degree::Failure);
    }

    #[test]
    fn natural_1_bumps_down() {
        // Would be success on totals alone, but die is 1.
        assert_eq!(degree_of_success(15, 15, 1), Degree::Failure);
    }

    #[test]
    fn bumps_saturate() {
        assert_eq!(degree_of_success(50, 15, 20), Degree::CriticalSuccess);
        assert_eq!(degree_of_success(-50, 15, 1), Degree::CriticalFailure);
    }
}
