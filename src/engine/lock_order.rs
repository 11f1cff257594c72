use crate::domain::AccountId;

/// Order in which the two accounts of a transfer are locked.
///
/// Ascending by id, whatever the transfer direction. Two transfers over the
/// same pair therefore always queue on the same account first and can never
/// wait on each other in a cycle.
pub fn lock_order(a: AccountId, b: AccountId) -> [AccountId; 2] {
    if a <= b { [a, b] } else { [b, a] }
}
