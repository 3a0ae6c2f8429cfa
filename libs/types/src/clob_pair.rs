//! Market (CLOB pair) parameters

use crate::ids::ClobPairId;
use crate::numeric::BaseQuantums;
use serde::{Deserialize, Serialize};

/// Static parameters of one trading market
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClobPair {
    pub id: ClobPairId,
    /// Perpetual (risk instrument) traded on this market
    pub perpetual_id: u32,
    pub subticks_per_tick: u32,
    pub min_order_base_quantums: BaseQuantums,
    pub step_base_quantums: BaseQuantums,
}

impl ClobPair {
    pub fn new(
        id: ClobPairId,
        perpetual_id: u32,
        subticks_per_tick: u32,
        min_order_base_quantums: BaseQuantums,
        step_base_quantums: BaseQuantums,
    ) -> Self {
        Self {
            id,
            perpetual_id,
            subticks_per_tick,
            min_order_base_quantums,
            step_base_quantums,
        }
    }
}
