//! Settlement calculator
//!
//! Pure arithmetic, no I/O. Money is `Decimal`; every rounding step rounds
//! half away from zero to whole won.
//!
//! Project fee cascade for one designer allocation:
//!
//! ```text
//! net_B         = T / 1.1 - discount_net
//! channel_fee   = fee_base × market_fee_rate      (fee_base = net_B or T)
//! ad_fee        = net_B × ad_rate
//! program_fee   = net_B × program_rate
//! pool          = net_B - channel_fee - ad_fee - program_fee
//! base          = pool × percent / 100
//! bonus         = base × bonus_pct / 100
//! before        = round(base + bonus)
//! tax           = round(before × 0.033)
//! after         = before - tax
//! ```
//!
//! Non-project sources pay their flat amount through the same withholding.

use payline_common::db::models::{Channel, DesignerAllocation, FeeBase};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

/// Withholding tax rate (3.3%)
pub const WITHHOLDING_RATE: Decimal = Decimal::from_parts(33, 0, 0, false, 3);

/// VAT divisor: gross amounts include 10% VAT
pub const VAT_DIVISOR: Decimal = Decimal::from_parts(11, 0, 0, false, 1);

/// Round to whole won, half away from zero
pub fn round_won(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
}

/// Fee rates applied to a project
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeeProfile {
    pub ad_rate: Decimal,
    pub program_rate: Decimal,
    pub market_fee_rate: Decimal,
    pub fee_base: FeeBase,
}

impl FeeProfile {
    pub fn from_channel(channel: &Channel) -> Self {
        Self {
            ad_rate: channel.ad_rate,
            program_rate: channel.program_rate,
            market_fee_rate: channel.market_fee_rate,
            fee_base: channel.fee_base,
        }
    }

    /// Profile for projects without a known channel: no market fee
    pub fn without_channel(ad_rate: Decimal, program_rate: Decimal) -> Self {
        Self {
            ad_rate,
            program_rate,
            market_fee_rate: Decimal::ZERO,
            fee_base: FeeBase::Net,
        }
    }
}

/// Withholding applied to a pre-tax amount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Withholding {
    pub before_withholding: Decimal,
    pub withholding_tax: Decimal,
    pub after_withholding: Decimal,
}

/// Apply 3.3% withholding to an amount
pub fn withhold(amount: Decimal) -> Withholding {
    let before_withholding = round_won(amount);
    let withholding_tax = round_won(before_withholding * WITHHOLDING_RATE);
    Withholding {
        before_withholding,
        withholding_tax,
        after_withholding: before_withholding - withholding_tax,
    }
}

/// Project-level amounts shared by every allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProjectFees {
    pub gross: Decimal,
    pub net: Decimal,
    pub channel_fee: Decimal,
    pub ad_fee: Decimal,
    pub program_fee: Decimal,
    /// Amount split between designers
    pub pool: Decimal,
}

/// Fee cascade from the gross amount down to the designer pool
pub fn project_fees(gross: Decimal, discount_net: Decimal, fees: &FeeProfile) -> ProjectFees {
    let net = gross / VAT_DIVISOR - discount_net;
    let fee_base = match fees.fee_base {
        FeeBase::Net => net,
        FeeBase::Gross => gross,
    };
    let channel_fee = fee_base * fees.market_fee_rate;
    let ad_fee = net * fees.ad_rate;
    let program_fee = net * fees.program_rate;

    ProjectFees {
        gross,
        net,
        channel_fee,
        ad_fee,
        program_fee,
        pool: net - channel_fee - ad_fee - program_fee,
    }
}

/// One designer's payout from a project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DesignerPayout {
    pub base: Decimal,
    pub bonus: Decimal,
    pub withholding: Withholding,
}

/// Split a project pool for one allocation
pub fn designer_payout(fees: &ProjectFees, allocation: &DesignerAllocation) -> DesignerPayout {
    let base = fees.pool * allocation.percent / Decimal::ONE_HUNDRED;
    let bonus = base * allocation.bonus_pct / Decimal::ONE_HUNDRED;
    DesignerPayout {
        base,
        bonus,
        withholding: withhold(base + bonus),
    }
}
