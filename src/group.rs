// ===============================
// src/group.rs (atomic operation groups)
// ===============================
//
// A group is 1..=MAX_GROUP_SIZE operations the ledger commits all-or-nothing.
// The group id is a hash over the ordered member digests (each taken with the
// group field cleared), so reordering members yields a different id. Every
// member carries the same id; members are signed by their own sender's key.
//
use tracing::debug;

use crate::domain::{tagged_digest, GroupId, Operation, SignedOperation, TxId};
use crate::error::{Result, SeedError};
use crate::ledger::Ledger;
use crate::metrics::SUBMISSIONS;
use crate::signer::Signer;

pub const MAX_GROUP_SIZE: usize = 16;

fn member_digest(op: &Operation) -> [u8; 32] {
    let mut bare = op.clone();
    bare.group = None;
    tagged_digest(b"TX", &bare.canonical_bytes())
}

pub fn compute_group_id(ops: &[Operation]) -> GroupId {
    let mut payload = Vec::with_capacity(32 * ops.len());
    for op in ops {
        payload.extend_from_slice(&member_digest(op));
    }
    GroupId(hex::encode_upper(tagged_digest(b"TG", &payload)))
}

#[derive(Debug, Clone)]
pub struct AtomicGroup {
    id: GroupId,
    ops: Vec<Operation>,
}

impl AtomicGroup {
    /// Stamps the group id on every member; caller order is preserved.
    pub fn new(mut ops: Vec<Operation>) -> Result<Self> {
        if ops.is_empty() || ops.len() > MAX_GROUP_SIZE {
            return Err(SeedError::Submission(format!(
                "group must have 1..={MAX_GROUP_SIZE} members, got {}",
                ops.len()
            )));
        }
        let id = compute_group_id(&ops);
        for op in ops.iter_mut() {
            op.group = Some(id.clone());
        }
        Ok(Self { id, ops })
    }

    pub fn id(&self) -> &GroupId {
        &self.id
    }

    pub fn operations(&self) -> &[Operation] {
        &self.ops
    }

    pub fn sign(self, signers: &[&dyn Signer]) -> Result<Vec<SignedOperation>> {
        self.ops.into_iter().map(|op| sign_with(op, signers)).collect()
    }
}

fn sign_with(operation: Operation, signers: &[&dyn Signer]) -> Result<SignedOperation> {
    let signer = signers
        .iter()
        .find(|s| *s.address() == operation.sender)
        .ok_or_else(|| {
            SeedError::Config(format!("no signing key for sender {}", operation.sender))
        })?;
    let signature = signer.sign(&operation);
    Ok(SignedOperation { operation, signature })
}

/// Signs a standalone (ungrouped) operation.
pub fn sign_single(operation: Operation, signer: &dyn Signer) -> Result<SignedOperation> {
    sign_with(operation, &[signer])
}

/// Ledger-side integrity check: one shared id that matches the members.
pub fn verify_group(signed: &[SignedOperation]) -> Result<()> {
    match signed {
        [] => Err(SeedError::Submission("empty submission".into())),
        [single] if single.operation.group.is_none() => Ok(()),
        _ => {
            if signed.len() > MAX_GROUP_SIZE {
                return Err(SeedError::Submission(format!(
                    "group of {} exceeds {MAX_GROUP_SIZE} members",
                    signed.len()
                )));
            }
            let ops: Vec<Operation> = signed.iter().map(|s| s.operation.clone()).collect();
            let expected = compute_group_id(&ops);
            for (i, op) in ops.iter().enumerate() {
                if op.group.as_ref() != Some(&expected) {
                    return Err(SeedError::Submission(format!(
                        "member {i} ({}) carries group {:?}, expected {expected}",
                        op.txid(),
                        op.group
                    )));
                }
            }
            Ok(())
        }
    }
}

/// Submits a signed group (or single operation) as one unit.
pub async fn submit_group<L: Ledger>(
    ledger: &L,
    signed: Vec<SignedOperation>,
    kind: &str,
) -> Result<TxId> {
    let members = signed.len();
    let txid = ledger.submit(signed).await?;
    SUBMISSIONS.with_label_values(&[kind]).inc();
    debug!(%txid, kind, members, "submitted");
    Ok(txid)
}
