// Household points ledger: members, chore claims, reward redemptions, deductions.
// All reads and writes go through the store gateway, one transaction per operation.

pub mod catalog;
pub mod handlers;
pub mod members;
pub mod validation;
pub mod views;
