//! Protocol constants. All monetary values in wei (1 ether = 10^18 wei).

use alloy_primitives::{Address, U256, address};

/// Wei per ether.
pub const ETHER: u128 = 1_000_000_000_000_000_000;

/// Address of the deployed grader on the public test network.
pub const GRADER5_ADDRESS: Address = address!("5733eE985e22eFF46F595376d79e31413b1A1e16");

/// Chain id used by local chains.
pub const LOCAL_CHAIN_ID: u64 = 31_337;

/// Maximum nesting of calls inside one transaction.
pub const MAX_CALL_DEPTH: usize = 64;

/// The grader rejects `retrieve` unless the attached value is strictly above this.
pub const GRADER_MIN_VALUE: u64 = 3;

/// Amount the grader sends back to the caller on every `retrieve`.
pub const GRADER_REFUND: u64 = 1;

/// `retrieve` reverts once a caller's counter reaches this value.
pub const GRADER_ATTEMPT_CAP: u64 = 4;

/// `gradeMe` requires the caller's counter to be strictly above this.
pub const GRADER_THRESHOLD: u64 = 1;

/// Divisor applied to the global registration count when computing grades.
pub const GRADER_DIVISOR: u64 = 8;

/// Deadline used by the deployed grader (effectively "never").
pub const GRADER_DEADLINE: u64 = 10_000_000_000;

/// Highest grade the formula produces (first registrations).
pub const MAX_GRADE: u64 = 100;

/// Grade given once the banded formula bottoms out.
pub const FLOOR_GRADE: u64 = 70;

/// Convert a whole number of ether to wei.
///
/// # Examples
///
/// ```
/// use reentry_core::constants::{ether, ETHER};
/// use alloy_primitives::U256;
/// assert_eq!(ether(2), U256::from(2 * ETHER));
/// ```
pub fn ether(amount: u64) -> U256 {
    U256::from(amount) * U256::from(ETHER)
}

/// Convert milli-ether (0.001 ether) to wei.
///
/// # Examples
///
/// ```
/// use reentry_core::constants::{milli_ether, ETHER};
/// use alloy_primitives::U256;
/// assert_eq!(milli_ether(1), U256::from(ETHER / 1000));
/// ```
pub fn milli_ether(amount: u64) -> U256 {
    U256::from(amount) * U256::from(ETHER / 1000)
}

/// Banded grade formula the grader reports for the next registration.
///
/// `band = registered / divisor`; bands 0..=6 map to `100 - 5 * band`,
/// everything above to [`FLOOR_GRADE`]. A zero divisor is treated as 1.
///
/// # Examples
///
/// ```
/// use reentry_core::constants::grade_for;
/// assert_eq!(grade_for(0, 8), 100);
/// assert_eq!(grade_for(15, 8), 95);
/// assert_eq!(grade_for(56, 8), 70);
/// assert_eq!(grade_for(1_000, 8), 70);
/// ```
pub fn grade_for(registered: u64, divisor: u64) -> u64 {
    let band = registered / divisor.max(1);
    if band <= 6 {
        MAX_GRADE - band * 5
    } else {
        FLOOR_GRADE
    }
}

/// Format a wei amount as a decimal ether string with up to 18 fractional digits.
///
/// # Examples
///
/// ```
/// use reentry_core::constants::{format_ether, milli_ether};
/// assert_eq!(format_ether(milli_ether(1)), "0.001");
/// assert_eq!(format_ether(alloy_primitives::U256::ZERO), "0");
/// ```
pub fn format_ether(wei: U256) -> String {
    let unit = U256::from(ETHER);
    let whole = wei / unit;
    let frac = wei % unit;
    if frac.is_zero() {
        return whole.to_string();
    }
    let frac = format!("{:0>18}", frac.to_string());
    format!("{whole}.{}", frac.trim_end_matches('0'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grade_bands_step_by_five() {
        let grades: Vec<u64> = (0..8).map(|band| grade_for(band * 8, 8)).collect();
        assert_eq!(grades, vec![100, 95, 90, 85, 80, 75, 70, 70]);
    }

    #[test]
    fn grade_with_zero_divisor_does_not_panic() {
        assert_eq!(grade_for(3, 0), 85);
    }

    #[test]
    fn format_ether_keeps_significant_fraction() {
        assert_eq!(format_ether(ether(1) + U256::from(1)), "1.000000000000000001");
        assert_eq!(format_ether(ether(3)), "3");
    }

    #[test]
    fn grader_address_is_not_zero() {
        assert!(!GRADER5_ADDRESS.is_zero());
    }

    #[test]
    fn cap_leaves_room_above_threshold() {
        assert!(GRADER_THRESHOLD + 1 < GRADER_ATTEMPT_CAP);
    }

    proptest::proptest! {
        #[test]
        fn grades_stay_in_range_and_never_rise(registered in 0u64..10_000, divisor in 0u64..64) {
            let grade = grade_for(registered, divisor);
            proptest::prop_assert!((FLOOR_GRADE..=MAX_GRADE).contains(&grade));
            proptest::prop_assert!(grade_for(registered + 1, divisor) <= grade);
        }
    }
}
