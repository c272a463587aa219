//! Render snapshot of the mint page.

use serde::Serialize;
use shared::{
    config::MintVariant,
    domain::{group_thousands, Address, MintRequestState, U256},
    error::MintRejected,
};

pub const CONNECT_PROMPT: &str = "Connect wallet to mint";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MintView {
    pub title: String,
    pub is_connected: bool,
    pub address: Option<Address>,
    pub total_supply: Option<U256>,
    pub balance_of: Option<U256>,
    pub mint_state: MintRequestState,
    /// Quantities rendered as mint buttons; empty while disconnected.
    pub mint_options: Vec<u64>,
    pub mint_enabled: bool,
}

impl MintView {
    /// `"1,000 minted"`; an unread supply renders as zero.
    pub fn supply_label(&self) -> String {
        format!(
            "{} minted",
            group_thousands(self.total_supply.unwrap_or(U256::ZERO))
        )
    }

    /// `"You minted: x3"`, or `"You minted: x?"` while the balance is unknown.
    pub fn balance_label(&self) -> String {
        match self.balance_of {
            Some(balance) => format!("You minted: x{balance}"),
            None => "You minted: x?".to_string(),
        }
    }

    pub fn connect_prompt(&self) -> Option<&'static str> {
        (!self.is_connected).then_some(CONNECT_PROMPT)
    }
}

/// Guards shared by the rendered mint control and the mint operation itself.
/// Quantity validation is separate since it depends on the button pressed.
pub(crate) fn check_mint_allowed(
    variant: &MintVariant,
    is_connected: bool,
    balance_of: Option<U256>,
    state: &MintRequestState,
) -> Result<(), MintRejected> {
    if !is_connected {
        return Err(MintRejected::NotConnected);
    }
    if state.is_pending() {
        return Err(MintRejected::AlreadyPending);
    }
    if let MintVariant::FreeMint { wallet_cap, .. } = variant {
        if state.is_success() {
            return Err(MintRejected::AlreadyMinted);
        }
        let balance = balance_of.ok_or(MintRejected::BalanceUnknown)?;
        if balance >= U256::from(*wallet_cap) {
            return Err(MintRejected::WalletCapReached {
                balance,
                cap: *wallet_cap,
            });
        }
    }
    Ok(())
}
