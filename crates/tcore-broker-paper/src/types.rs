use tcore_schemas::{Micros, TenantId};

/// Key for the seeded quote-balance table: `(tenant, quote_asset, account_type)`.
/// `account_type` is carried as its wire string (`"spot"` / `"isolated_margin"`)
/// so the map doesn't need to depend on the exact enum repr.
pub type BalanceKey = (TenantId, String, String);

#[derive(Debug, Clone, Copy, Default)]
pub struct SeededPrice {
    pub bid: Micros,
    pub ask: Micros,
}

#[derive(Debug, Clone)]
pub struct TransferRecord {
    pub direction: tcore_exchange::TransferDirection,
    pub asset: String,
    pub amount: Micros,
    pub symbol: Option<String>,
}
