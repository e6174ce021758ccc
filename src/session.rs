//! Wallet session: the signing identity and its liveness.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use ethers::{
    middleware::SignerMiddleware,
    providers::{Http, Middleware, Provider},
    signers::{LocalWallet, Signer},
    types::Address,
};
use tracing::{info, warn};

use crate::errors::SessionError;

/// Provider + local key, the client every contract call goes through.
pub type SignerClient = SignerMiddleware<Provider<Http>, LocalWallet>;

/// Source of the active signing identity.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn is_session_active(&self) -> bool;

    fn current_address(&self) -> Address;
}

/// Session backed by a JSON-RPC node and a locally held key.
///
/// The chain id is pinned at connect time. Seeing a different chain later
/// invalidates the session for good; callers must build a fresh session and
/// fresh contract handles instead of trying to recover.
pub struct WalletSession<M> {
    client: Arc<M>,
    address: Address,
    chain_id: u64,
    active: AtomicBool,
}

impl WalletSession<SignerClient> {
    pub async fn connect(
        rpc_url: &str,
        private_key: &str,
        expected_chain_id: Option<u64>,
    ) -> Result<Self, SessionError> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| SessionError::ProviderUnavailable(e.to_string()))?;
        let actual = provider
            .get_chainid()
            .await
            .map_err(|e| SessionError::ProviderUnavailable(e.to_string()))?
            .as_u64();

        if let Some(expected) = expected_chain_id {
            if expected != actual {
                return Err(SessionError::WrongChain { expected, actual });
            }
        }

        let wallet = private_key
            .trim()
            .trim_start_matches("0x")
            .parse::<LocalWallet>()
            .map_err(|e| SessionError::InvalidKey(e.to_string()))?
            .with_chain_id(actual);
        let address = wallet.address();
        let client = Arc::new(SignerMiddleware::new(provider, wallet));

        info!(?address, chain_id = actual, "[SESSION] connected");
        Ok(Self::new(client, address, actual))
    }
}

impl<M: Middleware> WalletSession<M> {
    pub fn new(client: Arc<M>, address: Address, chain_id: u64) -> Self {
        Self {
            client,
            address,
            chain_id,
            active: AtomicBool::new(true),
        }
    }

    pub fn client(&self) -> Arc<M> {
        self.client.clone()
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Explicit disconnect.
    pub fn invalidate(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            info!(address = ?self.address, "[SESSION] invalidated");
        }
    }
}

#[async_trait]
impl<M> SessionProvider for WalletSession<M>
where
    M: Middleware + 'static,
{
    async fn is_session_active(&self) -> bool {
        if !self.active.load(Ordering::SeqCst) {
            return false;
        }
        match self.client.get_chainid().await {
            Ok(id) if id.as_u64() == self.chain_id => true,
            Ok(id) => {
                warn!(
                    expected = self.chain_id,
                    actual = id.as_u64(),
                    "[SESSION] chain changed, session needs a hard reset"
                );
                self.invalidate();
                false
            }
            Err(e) => {
                warn!(error = %e, "[SESSION] liveness check failed");
                false
            }
        }
    }

    fn current_address(&self) -> Address {
        self.address
    }
}
