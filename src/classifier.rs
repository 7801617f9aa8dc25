use crate::amount::scale_amount;
use crate::chain::{ChainClient, call_contract, is_revert};
use crate::error::IngestError;
use crate::events::{decimalsCall, nameCall, symbolCall, totalSupplyCall};
use alloy::sol_types::SolCall;
use alloy_primitives::{Address, U256};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenMetadata {
    pub address: Address,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub total_supply: U256,
}

impl TokenMetadata {
    pub fn scaled_total_supply(&self) -> Result<String, IngestError> {
        scale_amount(self.total_supply, self.decimals).map_err(IngestError::decode)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Token(TokenMetadata),
    NotAToken,
}

/// Decides whether a contract looks like an ERC20 token.
///
/// A non-empty, non-zero `decimals()` return is taken as evidence of the
/// ERC20 shape; the remaining metadata is read only after that. A reverted
/// `decimals()` means the contract has no such method. Nothing is cached, so
/// every call re-reads the contract.
pub struct TokenClassifier<C> {
    client: Arc<C>,
}

impl<C: ChainClient> TokenClassifier<C> {
    pub fn new(client: Arc<C>) -> Self {
        Self { client }
    }

    pub async fn classify(&self, address: Address) -> Result<Classification, IngestError> {
        let raw = match self
            .client
            .call(address, decimalsCall {}.abi_encode().into())
            .await
        {
            Ok(raw) => raw,
            Err(e) if is_revert(&e) => {
                debug!("Contract {:?} reverted on decimals(), not a token", address);
                return Ok(Classification::NotAToken);
            }
            Err(e) => return Err(IngestError::chain(e)),
        };

        if raw.iter().all(|byte| *byte == 0) {
            debug!("Contract {:?} has no decimals(), not a token", address);
            return Ok(Classification::NotAToken);
        }

        let decimals = decimalsCall::abi_decode_returns(&raw).map_err(IngestError::decode)?;
        let name = call_contract(self.client.as_ref(), address, nameCall {}).await?;
        let symbol = call_contract(self.client.as_ref(), address, symbolCall {}).await?;
        let total_supply = call_contract(self.client.as_ref(), address, totalSupplyCall {}).await?;

        info!("Classified {:?} as token {} ({})", address, name, symbol);

        Ok(Classification::Token(TokenMetadata {
            address,
            name,
            symbol,
            decimals,
            total_supply,
        }))
    }
}
