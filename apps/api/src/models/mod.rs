// Row types shared by the persistence gateway and the ledger services.

pub mod catalog;
pub mod member;
