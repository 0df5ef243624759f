// ===============================
// src/programs.rs (hook / pool call interface)
// ===============================
//
// Builders for the unsigned operations the run submits. Numeric program
// arguments are always 8-byte big-endian; the first argument is the method tag.
//
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::curve::TickAllocation;
use crate::domain::{
    Address, AppCall, AppId, AssetId, AssetParams, BoxRef, Operation, OperationKind, StateSchema,
    SuggestedParams,
};
use crate::error::{Result, SeedError};
use crate::slot;

pub const METHOD_SET_HOOKS: &[u8] = b"set_hooks";
pub const METHOD_OPT_IN_ASSETS: &[u8] = b"opt_in_assets";
pub const METHOD_MINT: &[u8] = b"mint";
pub const METHOD_SWAP: &[u8] = b"swap";

// flat fees per call kind
pub const FEE_DEFAULT: u64 = 2_000;
pub const FEE_OPT_IN_ASSETS: u64 = 6_000;
pub const FEE_MINT: u64 = 4_000;
pub const FEE_SWAP: u64 = 3_000;

/// Hook capability bit: run the hook after each swap.
pub const HOOK_POST_SWAP: u64 = 2;

pub const PROGRAM_GLOBAL_SCHEMA: StateSchema = StateSchema { num_uints: 8, num_byte_slices: 8 };
pub const PROGRAM_LOCAL_SCHEMA: StateSchema = StateSchema { num_uints: 0, num_byte_slices: 0 };

pub fn be8(v: u64) -> Vec<u8> {
    v.to_be_bytes().to_vec()
}

/// Compiled approval/clear programs for the hook and the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Programs {
    pub hook_approval: Vec<u8>,
    pub hook_clear: Vec<u8>,
    pub pool_approval: Vec<u8>,
    pub pool_clear: Vec<u8>,
}

impl Programs {
    pub async fn load(dir: &Path) -> Result<Self> {
        async fn read(dir: &Path, name: &str) -> Result<Vec<u8>> {
            let path = dir.join(name);
            let bytes = tokio::fs::read(&path).await.map_err(|e| {
                SeedError::Config(format!("cannot read program {}: {e}", path.display()))
            })?;
            if bytes.is_empty() {
                return Err(SeedError::Config(format!("program {} is empty", path.display())));
            }
            Ok(bytes)
        }
        Ok(Self {
            hook_approval: read(dir, "hook_approval.bin").await?,
            hook_clear: read(dir, "hook_clear.bin").await?,
            pool_approval: read(dir, "pool_approval.bin").await?,
            pool_clear: read(dir, "pool_clear.bin").await?,
        })
    }

    /// Tagged stand-ins the simulated ledger recognises.
    pub fn placeholder() -> Self {
        Self {
            hook_approval: b"#hook-approval".to_vec(),
            hook_clear: b"#hook-clear".to_vec(),
            pool_approval: b"#pool-approval".to_vec(),
            pool_clear: b"#pool-clear".to_vec(),
        }
    }
}

/// Everything a pool call needs to reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolRefs {
    pub pool_id: AppId,
    pub pool_address: Address,
    pub hook_id: AppId,
    pub asset_a: AssetId,
    pub asset_b: AssetId,
}

fn op(sender: &Address, sp: &SuggestedParams, fee: u64, kind: OperationKind) -> Operation {
    Operation {
        sender: sender.clone(),
        fee: fee.max(sp.min_fee),
        first_valid: sp.first_valid,
        last_valid: sp.last_valid,
        kind,
        group: None,
    }
}

pub fn payment(sender: &Address, sp: &SuggestedParams, receiver: &Address, amount: u64) -> Operation {
    op(sender, sp, FEE_DEFAULT, OperationKind::Payment { receiver: receiver.clone(), amount })
}

pub fn asset_transfer(
    sender: &Address,
    sp: &SuggestedParams,
    fee: u64,
    receiver: &Address,
    asset_id: AssetId,
    amount: u64,
) -> Operation {
    op(
        sender,
        sp,
        fee,
        OperationKind::AssetTransfer { receiver: receiver.clone(), asset_id, amount },
    )
}

/// Zero-amount transfer to self: lets the account hold `asset_id`.
pub fn asset_opt_in(account: &Address, sp: &SuggestedParams, asset_id: AssetId) -> Operation {
    asset_transfer(account, sp, FEE_DEFAULT, account, asset_id, 0)
}

pub fn create_asset(
    creator: &Address,
    sp: &SuggestedParams,
    unit_name: &str,
    asset_name: &str,
    total: u64,
    decimals: u32,
) -> Operation {
    let params = AssetParams {
        total,
        decimals,
        default_frozen: false,
        unit_name: unit_name.to_string(),
        asset_name: asset_name.to_string(),
        manager: creator.clone(),
        reserve: creator.clone(),
        freeze: creator.clone(),
        clawback: creator.clone(),
    };
    op(creator, sp, FEE_DEFAULT, OperationKind::AssetCreate(params))
}

pub fn create_app(
    creator: &Address,
    sp: &SuggestedParams,
    approval: &[u8],
    clear: &[u8],
    foreign_assets: Vec<AssetId>,
    foreign_apps: Vec<AppId>,
) -> Operation {
    op(
        creator,
        sp,
        FEE_DEFAULT,
        OperationKind::AppCreate {
            approval: approval.to_vec(),
            clear: clear.to_vec(),
            global_schema: PROGRAM_GLOBAL_SCHEMA,
            local_schema: PROGRAM_LOCAL_SCHEMA,
            foreign_assets,
            foreign_apps,
        },
    )
}

/// Unsigned program invocation: method tag + 8-byte numeric args, optional
/// slot storage reference, plus the assets/programs the call touches.
#[allow(clippy::too_many_arguments)]
pub fn app_call(
    sender: &Address,
    sp: &SuggestedParams,
    fee: u64,
    app_id: AppId,
    method: &[u8],
    numeric_args: &[u64],
    slot_key: Option<Vec<u8>>,
    foreign_assets: Vec<AssetId>,
    foreign_apps: Vec<AppId>,
) -> Operation {
    let mut args = Vec::with_capacity(1 + numeric_args.len());
    args.push(method.to_vec());
    args.extend(numeric_args.iter().map(|v| be8(*v)));
    let boxes = slot_key
        .map(|name| vec![BoxRef { app_id, name }])
        .unwrap_or_default();
    op(
        sender,
        sp,
        fee,
        OperationKind::AppCall(AppCall { app_id, args, foreign_assets, foreign_apps, boxes }),
    )
}

pub fn set_hooks(
    admin: &Address,
    sp: &SuggestedParams,
    pool_id: AppId,
    hook_id: AppId,
    hook_mask: u64,
    protocol_fee_bp: u64,
) -> Operation {
    app_call(
        admin,
        sp,
        FEE_DEFAULT,
        pool_id,
        METHOD_SET_HOOKS,
        &[hook_id, hook_mask, protocol_fee_bp],
        None,
        vec![],
        vec![hook_id],
    )
}

pub fn opt_in_assets(
    admin: &Address,
    sp: &SuggestedParams,
    pool_id: AppId,
    asset_a: AssetId,
    asset_b: AssetId,
) -> Operation {
    app_call(
        admin,
        sp,
        FEE_OPT_IN_ASSETS,
        pool_id,
        METHOD_OPT_IN_ASSETS,
        &[asset_a, asset_b],
        None,
        vec![asset_a, asset_b],
        vec![],
    )
}

/// Mint call followed by one transfer per non-zero leg.
/// `None` when both legs are zero: nothing to deposit.
pub fn mint_group(
    trader: &Address,
    sp: &SuggestedParams,
    refs: &PoolRefs,
    alloc: &TickAllocation,
) -> Result<Option<Vec<Operation>>> {
    if alloc.is_empty() {
        return Ok(None);
    }
    let slot_id = slot::encode(alloc.tick)?;
    let call = app_call(
        trader,
        sp,
        FEE_MINT,
        refs.pool_id,
        METHOD_MINT,
        &[slot_id],
        Some(slot::storage_key(alloc.tick)?),
        vec![refs.asset_a, refs.asset_b],
        vec![],
    );
    let mut ops = vec![call];
    for (asset, amount) in [(refs.asset_a, alloc.amount_a), (refs.asset_b, alloc.amount_b)] {
        if amount > 0 {
            ops.push(asset_transfer(trader, sp, FEE_MINT, &refs.pool_address, asset, amount));
        }
    }
    Ok(Some(ops))
}

/// Swap call against `tick` followed by the inbound transfer.
pub fn swap_group(
    trader: &Address,
    sp: &SuggestedParams,
    refs: &PoolRefs,
    tick: i64,
    asset_in: AssetId,
    amount_in: u64,
) -> Result<Vec<Operation>> {
    if asset_in != refs.asset_a && asset_in != refs.asset_b {
        return Err(SeedError::Config(format!(
            "swap asset {asset_in} is not one of the pool assets {}/{}",
            refs.asset_a, refs.asset_b
        )));
    }
    let slot_id = slot::encode(tick)?;
    let call = app_call(
        trader,
        sp,
        FEE_SWAP,
        refs.pool_id,
        METHOD_SWAP,
        &[slot_id],
        Some(slot::storage_key(tick)?),
        vec![refs.asset_a, refs.asset_b],
        vec![refs.hook_id],
    );
    let pay_in = asset_transfer(trader, sp, FEE_SWAP, &refs.pool_address, asset_in, amount_in);
    Ok(vec![call, pay_in])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sp() -> SuggestedParams {
        SuggestedParams { first_valid: 5, last_valid: 1005, min_fee: 1000 }
    }

    fn refs() -> PoolRefs {
        PoolRefs {
            pool_id: 20,
            pool_address: Address("POOL".into()),
            hook_id: 10,
            asset_a: 1,
            asset_b: 2,
        }
    }

    fn trader() -> Address {
        Address("TRADER".into())
    }

    fn as_call(op: &Operation) -> &AppCall {
        match &op.kind {
            OperationKind::AppCall(c) => c,
            other => panic!("not an app call: {other:?}"),
        }
    }

    #[test]
    fn set_hooks_args_are_fixed_width() {
        let op = set_hooks(&Address("ADMIN".into()), &sp(), 20, 10, HOOK_POST_SWAP, 30);
        let call = as_call(&op);
        assert_eq!(call.method(), Some(METHOD_SET_HOOKS));
        assert_eq!(call.args.len(), 4);
        assert!(call.args[1..].iter().all(|a| a.len() == 8));
        assert_eq!(call.u64_arg(1), Some(10));
        assert_eq!(call.u64_arg(2), Some(2));
        assert_eq!(call.u64_arg(3), Some(30));
        assert_eq!(call.foreign_apps, vec![10]);
        assert_eq!(op.fee, FEE_DEFAULT);
    }

    #[test]
    fn mint_group_layout() {
        let alloc = TickAllocation { tick: -3, amount_a: 11, amount_b: 5 };
        let ops = mint_group(&trader(), &sp(), &refs(), &alloc).unwrap().unwrap();
        assert_eq!(ops.len(), 3);
        let call = as_call(&ops[0]);
        assert_eq!(call.method(), Some(METHOD_MINT));
        assert_eq!(call.u64_arg(1), Some(9_997));
        assert_eq!(call.boxes[0].name, slot::storage_key(-3).unwrap());
        assert_eq!(call.boxes[0].app_id, 20);
        let legs: Vec<(u64, u64)> = ops[1..]
            .iter()
            .map(|op| match &op.kind {
                OperationKind::AssetTransfer { asset_id, amount, receiver } => {
                    assert_eq!(receiver.0, "POOL");
                    (*asset_id, *amount)
                }
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(legs, vec![(1, 11), (2, 5)]);
        assert!(ops.iter().all(|o| o.fee == FEE_MINT && o.group.is_none()));
    }

    #[test]
    fn mint_group_drops_zero_legs_and_empty_ticks() {
        let one_leg = TickAllocation { tick: 4, amount_a: 0, amount_b: 3 };
        let ops = mint_group(&trader(), &sp(), &refs(), &one_leg).unwrap().unwrap();
        assert_eq!(ops.len(), 2);

        let empty = TickAllocation { tick: 4, amount_a: 0, amount_b: 0 };
        assert!(mint_group(&trader(), &sp(), &refs(), &empty).unwrap().is_none());

        let bad = TickAllocation { tick: 10_001, amount_a: 1, amount_b: 1 };
        assert!(matches!(
            mint_group(&trader(), &sp(), &refs(), &bad),
            Err(SeedError::InvalidTick { tick: 10_001, .. })
        ));
    }

    #[test]
    fn swap_group_layout() {
        let ops = swap_group(&trader(), &sp(), &refs(), 0, 1, 50).unwrap();
        assert_eq!(ops.len(), 2);
        let call = as_call(&ops[0]);
        assert_eq!(call.method(), Some(METHOD_SWAP));
        assert_eq!(call.u64_arg(1), Some(10_000));
        assert_eq!(call.foreign_apps, vec![10]);
        assert!(matches!(
            ops[1].kind,
            OperationKind::AssetTransfer { asset_id: 1, amount: 50, .. }
        ));
        assert!(swap_group(&trader(), &sp(), &refs(), 0, 99, 50).is_err());
    }

    #[test]
    fn fee_never_below_minimum() {
        let high = SuggestedParams { min_fee: 9_000, ..sp() };
        assert_eq!(payment(&trader(), &high, &trader(), 1).fee, 9_000);
    }

    #[tokio::test]
    async fn load_reports_missing_files() {
        let dir = std::env::temp_dir().join("clmm_seeder_no_such_programs");
        let err = Programs::load(&dir).await.unwrap_err();
        assert!(err.to_string().contains("hook_approval.bin"));
    }
}
