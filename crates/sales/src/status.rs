//! Order status state machine.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use orderdesk_core::DomainError;

/// Order status lifecycle.
///
/// `Pending` is initial, `Cancelled` is terminal. Persisted as the lowercase
/// variant name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Paid,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 3] = [OrderStatus::Pending, OrderStatus::Paid, OrderStatus::Cancelled];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// No transition leaves a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Cancelled)
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "paid" => Ok(OrderStatus::Paid),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(DomainError::validation(format!("unknown order status '{other}'"))),
        }
    }
}

/// A status change the state machine does not allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot transition order from {from} to {to}")]
pub struct StatusTransitionError {
    pub from: OrderStatus,
    pub to: OrderStatus,
}

/// Whether an order in `from` may move to `to`.
///
/// Cancelled orders never move; paid orders never go back to pending.
/// Everything else, including staying in the same state, is allowed.
pub fn can_transition(from: OrderStatus, to: OrderStatus) -> bool {
    if from.is_terminal() {
        return false;
    }
    !matches!((from, to), (OrderStatus::Paid, OrderStatus::Pending))
}

pub fn ensure_transition(from: OrderStatus, to: OrderStatus) -> Result<(), StatusTransitionError> {
    if can_transition(from, to) {
        Ok(())
    } else {
        Err(StatusTransitionError { from, to })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use OrderStatus::*;

    #[test]
    fn transition_table() {
        let cases = [
            (Pending, Pending, true),
            (Pending, Paid, true),
            (Pending, Cancelled, true),
            (Paid, Pending, false),
            (Paid, Paid, true),
            (Paid, Cancelled, true),
            (Cancelled, Pending, false),
            (Cancelled, Paid, false),
            (Cancelled, Cancelled, false),
        ];
        for (from, to, expected) in cases {
            assert_eq!(can_transition(from, to), expected, "{from} -> {to}");
        }
    }

    #[test]
    fn only_cancelled_is_terminal() {
        assert!(Cancelled.is_terminal());
        assert!(!Pending.is_terminal());
        assert!(!Paid.is_terminal());
        for to in OrderStatus::ALL {
            assert!(!can_transition(Cancelled, to));
        }
    }

    #[test]
    fn ensure_transition_reports_both_states() {
        let err = ensure_transition(Cancelled, Paid).unwrap_err();
        assert_eq!(err, StatusTransitionError { from: Cancelled, to: Paid });
        assert_eq!(err.to_string(), "cannot transition order from cancelled to paid");
    }

    #[test]
    fn status_strings_round_trip() {
        for status in OrderStatus::ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert!("PAID".parse::<OrderStatus>().is_err());
        assert_eq!(serde_json::to_string(&Paid).unwrap(), "\"paid\"");
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn any_status() -> impl Strategy<Value = OrderStatus> {
            prop_oneof![Just(Pending), Just(Paid), Just(Cancelled)]
        }

        proptest! {
            /// Property: once cancelled, no sequence of requests leaves the terminal state.
            #[test]
            fn cancelled_is_absorbing(requests in proptest::collection::vec(any_status(), 0..20)) {
                let mut state = Cancelled;
                for to in requests {
                    if ensure_transition(state, to).is_ok() {
                        state = to;
                    }
                }
                prop_assert_eq!(state, Cancelled);
            }

            /// Property: a walk through accepted transitions never revisits pending after paid.
            #[test]
            fn paid_never_returns_to_pending(requests in proptest::collection::vec(any_status(), 0..20)) {
                let mut state = Pending;
                let mut seen_paid = false;
                for to in requests {
                    if can_transition(state, to) {
                        state = to;
                    }
                    seen_paid |= state == Paid;
                    prop_assert!(!(seen_paid && state == Pending));
                }
            }
        }
    }
}
