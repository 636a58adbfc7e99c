use std::sync::Arc;

use futures::future::join_all;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::config::BatchPolicy;
use crate::endpoint::ResolvedEndpoint;
use crate::keys::{AttemptKind, AuthAttempt, KeyPool};
use crate::transport::{ServiceTransport, Signature};

/// Result of one authentication batch.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    /// First real success in selection order.
    pub signature: Option<Signature>,
    pub real_count: usize,
    pub decoy_count: usize,
}

impl BatchOutcome {
    pub fn total(&self) -> usize {
        self.real_count + self.decoy_count
    }
}

/// Sampled batch: attempts in selection order (reals first) and the
/// permutation they are launched in.
#[derive(Debug)]
struct BatchPlan {
    attempts: Vec<AuthAttempt>,
    launch_order: Vec<usize>,
    real_count: usize,
    decoy_count: usize,
}

/// Issues real and decoy `/auth` attempts as one concurrent batch.
pub struct AuthDispatcher {
    transport: Arc<dyn ServiceTransport>,
    pool: Arc<KeyPool>,
    policy: BatchPolicy,
}

impl AuthDispatcher {
    pub fn new(transport: Arc<dyn ServiceTransport>, pool: Arc<KeyPool>, policy: BatchPolicy) -> Self {
        Self {
            transport,
            pool,
            policy,
        }
    }

    pub fn policy(&self) -> &BatchPolicy {
        &self.policy
    }

    pub fn pool(&self) -> &Arc<KeyPool> {
        &self.pool
    }

    pub fn transport(&self) -> &Arc<dyn ServiceTransport> {
        &self.transport
    }

    /// Run one batch and return its signature, if any real attempt produced one.
    pub async fn get_signature(&self, endpoint: &ResolvedEndpoint) -> Option<Signature> {
        self.dispatch(endpoint).await.signature
    }

    /// Run one batch. Every attempt is awaited before this returns, decoys
    /// included; individual failures only make that attempt absent.
    pub async fn dispatch(&self, endpoint: &ResolvedEndpoint) -> BatchOutcome {
        let plan = self.plan();
        tracing::debug!(
            real = plan.real_count,
            decoy = plan.decoy_count,
            "dispatching auth batch"
        );

        let launched = join_all(plan.launch_order.iter().map(|&index| {
            let attempt = &plan.attempts[index];
            async move { (index, self.attempt(endpoint, attempt).await) }
        }))
        .await;

        let mut results = vec![None; plan.attempts.len()];
        for (index, signature) in launched {
            results[index] = signature;
        }
        let signature = first_real_signature(&plan.attempts, results);
        if signature.is_none() {
            tracing::debug!("no real attempt in batch produced a signature");
        }

        BatchOutcome {
            signature,
            real_count: plan.real_count,
            decoy_count: plan.decoy_count,
        }
    }

    // The rng is scoped to this synchronous call; ThreadRng is not Send.
    fn plan(&self) -> BatchPlan {
        let mut rng = rand::thread_rng();
        let real_count = rng.gen_range(self.policy.real()).min(self.pool.len());
        let decoy_count = rng.gen_range(self.policy.decoy());

        let mut attempts: Vec<AuthAttempt> = self
            .pool
            .pick_distinct(real_count)
            .into_iter()
            .map(AuthAttempt::real)
            .collect();
        attempts.extend(
            (0..decoy_count)
                .map(|_| AuthAttempt::decoy(KeyPool::synthesize_decoy(self.policy.decoy_token_len()))),
        );

        let mut launch_order: Vec<usize> = (0..attempts.len()).collect();
        launch_order.shuffle(&mut rng);

        BatchPlan {
            attempts,
            launch_order,
            real_count,
            decoy_count,
        }
    }

    async fn attempt(&self, endpoint: &ResolvedEndpoint, attempt: &AuthAttempt) -> Option<Signature> {
        match self.transport.authenticate(endpoint, &attempt.token).await {
            Ok(signature) => match attempt.kind {
                AttemptKind::Real => Some(signature),
                AttemptKind::Decoy => None,
            },
            Err(e) => {
                tracing::trace!(kind = ?attempt.kind, error = %e, "auth attempt failed");
                None
            }
        }
    }
}

/// `results[i]` belongs to `attempts[i]`.
fn first_real_signature(
    attempts: &[AuthAttempt],
    results: Vec<Option<Signature>>,
) -> Option<Signature> {
    attempts
        .iter()
        .zip(results)
        .filter(|(attempt, _)| attempt.kind == AttemptKind::Real)
        .find_map(|(_, signature)| signature)
}
