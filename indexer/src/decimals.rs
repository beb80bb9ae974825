use std::collections::HashMap;

use domain::{ChainId, TokenType};

/// Used when neither the table nor the contract can tell.
pub const FALLBACK_DECIMALS: u8 = 6;

/// Known token decimals, consulted before any `decimals()` call.
///
/// Chain-specific overrides win over the per-token defaults.
#[derive(Debug, Clone, Default)]
pub struct DecimalsTable {
    overrides: HashMap<ChainId, HashMap<TokenType, u8>>,
    defaults: HashMap<TokenType, u8>,
}

impl DecimalsTable {
    pub fn standard() -> Self {
        Self::default()
            // BNB Chain's bridged USDT is an 18-decimal BEP-20.
            .with_override(ChainId(56), TokenType::Usdt, 18)
            .with_default(TokenType::Usdt, 6)
            .with_default(TokenType::Usdc, 6)
    }

    /// No shortcuts: every lookup goes to the chain.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_override(mut self, chain_id: ChainId, token_type: TokenType, decimals: u8) -> Self {
        self.overrides
            .entry(chain_id)
            .or_default()
            .insert(token_type, decimals);
        self
    }

    pub fn with_default(mut self, token_type: TokenType, decimals: u8) -> Self {
        self.defaults.insert(token_type, decimals);
        self
    }

    pub fn lookup(&self, chain_id: ChainId, token_type: TokenType) -> Option<u8> {
        self.overrides
            .get(&chain_id)
            .and_then(|by_token| by_token.get(&token_type))
            .or_else(|| self.defaults.get(&token_type))
            .copied()
    }
}
