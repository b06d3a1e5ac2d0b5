//! State-changing calls
//!
//! Writes go through the queue once (no cache, no deduplication, no retry)
//! and propagate every failure to the caller. Ownership and soulbound checks
//! read fresh chain state and only ever refuse early; the contract stays the
//! authority on what actually succeeds.

use super::ContractService;
use crate::cache::CacheKey;
use crate::chain::abi::{IERC6551Account, IERC6551Registry, IGalleryNft};
use crate::chain::{TransactionSigner, TxRequest};
use crate::constants::sinks::is_burn_sink;
use crate::error::{AppError, AppResult};
use crate::models::TxSubmission;
use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::SolCall;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Cached reads that a successful write can invalidate
const INVALIDATED_METHODS: &[&str] = &[
    "ownerOf",
    "balanceOf",
    "tokenOfOwnerByIndex",
    "totalSupply",
    "tokenByIndex",
    "tokenURI",
    "getCreatorTokens",
    "getCreators",
];

impl ContractService {
    fn signer(&self) -> AppResult<&Arc<dyn TransactionSigner>> {
        self.signer
            .as_ref()
            .ok_or_else(|| AppError::Forbidden("No signer connected".to_string()))
    }

    /// Mint `uri` to `to`, optionally soulbound
    pub async fn mint(&self, to: Address, uri: &str, soulbound: bool) -> AppResult<TxSubmission> {
        if to.is_zero() {
            return Err(AppError::Validation("Cannot mint to the zero address".to_string()));
        }
        if uri.trim().is_empty() {
            return Err(AppError::Validation("Token URI must not be empty".to_string()));
        }

        let call = IGalleryNft::mintCall {
            to,
            uri: uri.to_string(),
            soulbound,
        };
        let submission = self.submit(self.address, call.abi_encode(), U256::ZERO).await?;
        self.invalidate_after_write();
        Ok(submission)
    }

    /// Burn a token held by the connected signer
    pub async fn burn(&self, token_id: U256) -> AppResult<TxSubmission> {
        self.ensure_token_owner(token_id).await?;

        let call = IGalleryNft::burnCall { tokenId: token_id };
        let submission = self.submit(self.address, call.abi_encode(), U256::ZERO).await?;
        self.invalidate_after_write();
        Ok(submission)
    }

    /// `safeTransferFrom(signer, to, token_id)`
    pub async fn transfer(&self, token_id: U256, to: Address) -> AppResult<TxSubmission> {
        if is_burn_sink(&to) {
            return Err(AppError::Validation(
                "Use burn instead of transferring to a burn address".to_string(),
            ));
        }
        let from = self.ensure_token_owner(token_id).await?;

        let soulbound = self
            .read_fresh(self.address, IGalleryNft::isSoulboundCall { tokenId: token_id })
            .await
            .unwrap_or(false);
        if soulbound {
            return Err(AppError::Forbidden(format!(
                "Token {} is soulbound and cannot be transferred",
                token_id
            )));
        }

        let call = IGalleryNft::safeTransferFromCall {
            from,
            to,
            tokenId: token_id,
        };
        let submission = self.submit(self.address, call.abi_encode(), U256::ZERO).await?;
        self.invalidate_after_write();
        Ok(submission)
    }

    /// Deploy the token-bound account of a token held by the signer
    pub async fn create_token_bound_account(&self, token_id: U256) -> AppResult<TxSubmission> {
        let settings = self.account_settings()?;
        self.ensure_token_owner(token_id).await?;

        let call = IERC6551Registry::createAccountCall {
            implementation: settings.implementation,
            salt: settings.salt,
            chainId: settings.chain_id,
            tokenContract: self.address,
            tokenId: token_id,
        };
        let submission = self.submit(settings.registry, call.abi_encode(), U256::ZERO).await?;

        let prefix = CacheKey::contract_method_prefix(settings.registry, "account");
        self.cache.remove_prefix(&prefix);
        self.dedup.forget_prefix(&prefix);
        Ok(submission)
    }

    /// Execute a call from a token-bound account controlled by the signer
    pub async fn execute_account_call(
        &self,
        account: Address,
        target: Address,
        value: U256,
        data: Bytes,
        operation: u8,
    ) -> AppResult<TxSubmission> {
        let signer = self.signer()?.address();
        let owner = self.read_fresh(account, IERC6551Account::ownerCall {}).await?;
        if owner != signer {
            return Err(AppError::Forbidden(format!(
                "Account {} is controlled by {}, not {}",
                account, owner, signer
            )));
        }

        let call = IERC6551Account::executeCall {
            to: target,
            value,
            data,
            operation,
        };
        let submission = self.submit(account, call.abi_encode(), value).await?;

        let prefix = CacheKey::contract_method_prefix(account, "state");
        self.cache.remove_prefix(&prefix);
        self.dedup.forget_prefix(&prefix);
        Ok(submission)
    }

    /// Refuse early unless the signer currently owns `token_id`
    ///
    /// Reads the owner straight from the chain so a stale cache can neither
    /// allow nor block the operation. Returns the signer address.
    async fn ensure_token_owner(&self, token_id: U256) -> AppResult<Address> {
        let signer = self.signer()?.address();
        let owner = self
            .read_fresh(self.address, IGalleryNft::ownerOfCall { tokenId: token_id })
            .await?;

        if is_burn_sink(&owner) {
            return Err(AppError::NotFound(format!("Token {} is burned", token_id)));
        }
        if owner != signer {
            return Err(AppError::Forbidden(format!(
                "Token {} is owned by {}, not {}",
                token_id, owner, signer
            )));
        }
        Ok(signer)
    }

    async fn submit(&self, to: Address, data: Vec<u8>, value: U256) -> AppResult<TxSubmission> {
        let signer = self.signer()?.clone();
        let from = signer.address();
        let tx = TxRequest {
            from: Some(from),
            to,
            data: Bytes::from(data),
            value,
        };

        let tx_hash = self
            .queue
            .execute_cancellable(self.cancel.clone(), move || async move {
                signer.send_transaction(tx).await
            })
            .await?;

        tracing::info!(tx_hash = %tx_hash, from = %from, to = %to, "State-changing call submitted");
        Ok(TxSubmission { tx_hash, from, to })
    }

    fn invalidate_after_write(&self) {
        for method in INVALIDATED_METHODS {
            let prefix = CacheKey::contract_method_prefix(self.address, method);
            self.cache.remove_prefix(&prefix);
            self.dedup.forget_prefix(&prefix);
        }
        self.write_generation.fetch_add(1, Ordering::AcqRel);
        tracing::debug!(contract = %self.address, "Invalidated cached reads after write");
    }
}
