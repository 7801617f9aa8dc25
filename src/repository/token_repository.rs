use super::keys;
use super::models::{Holder, TokenRecord, address_key};
use crate::amount::{compare_amounts, is_positive};
use crate::store::Store;
use alloy_primitives::Address;
use anyhow::{Context, Result};
use std::collections::HashMap;

/// Token records and their per-holder balance maps.
pub struct TokenRepository<'a, S: Store + ?Sized> {
    store: &'a S,
}

impl<'a, S: Store + ?Sized> TokenRepository<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Overwrites the record for `token.address`.
    pub async fn put_token(&self, token: &TokenRecord) -> Result<()> {
        let value = serde_json::to_string(token)?;
        self.store.set(&keys::token(&token.address), &value).await
    }

    pub async fn get_token(&self, address: &Address) -> Result<Option<TokenRecord>> {
        self.load_token(&keys::token(address)).await
    }

    pub async fn token_count(&self) -> Result<usize> {
        Ok(self.store.keys_with_prefix(keys::TOKENS_PREFIX).await?.len())
    }

    /// Tokens ordered by address.
    pub async fn list_tokens(&self, limit: usize, offset: usize) -> Result<Vec<TokenRecord>> {
        let token_keys = self.store.keys_with_prefix(keys::TOKENS_PREFIX).await?;

        let mut tokens = Vec::new();
        for key in token_keys.iter().skip(offset).take(limit) {
            if let Some(token) = self.load_token(key).await? {
                tokens.push(token);
            }
        }
        Ok(tokens)
    }

    pub async fn upsert_balance(
        &self,
        token: &Address,
        holder: &Address,
        balance: &str,
    ) -> Result<()> {
        self.store
            .hash_set(&keys::balances(token), &address_key(holder), balance)
            .await
    }

    /// Complete balance map of `token`, zero balances included.
    pub async fn balances(&self, token: &Address) -> Result<HashMap<String, String>> {
        self.store.hash_get_all(&keys::balances(token)).await
    }

    pub async fn balance_of(&self, token: &Address, holder: &Address) -> Result<Option<String>> {
        self.store
            .hash_get(&keys::balances(token), &address_key(holder))
            .await
    }

    /// Holders with a strictly positive balance, largest first.
    pub async fn holders(
        &self,
        token: &Address,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Holder>> {
        let mut holders: Vec<Holder> = self
            .balances(token)
            .await?
            .into_iter()
            .filter(|(_, balance)| is_positive(balance))
            .map(|(address, balance)| Holder { address, balance })
            .collect();

        holders.sort_by(|a, b| {
            compare_amounts(&b.balance, &a.balance).then_with(|| a.address.cmp(&b.address))
        });

        Ok(holders.into_iter().skip(offset).take(limit).collect())
    }

    async fn load_token(&self, key: &str) -> Result<Option<TokenRecord>> {
        let raw = self.store.get(key).await?;
        raw.map(|raw| {
            serde_json::from_str(&raw).with_context(|| format!("Corrupt token record under {key}"))
        })
        .transpose()
    }
}
