//! Account visibility and view-key authentication.

use lws_core::crypto::secret_key_to_public_key;
use lws_core::error::{Expect, LwsError};
use lws_core::types::{Account, AccountAddress, AccountStatus, ViewKey};
use lws_db::StorageReader;

pub fn is_hidden(status: AccountStatus) -> bool {
    status == AccountStatus::Hidden
}

/// True when `view_key` is the secret half of the address' view public key.
pub fn key_check(address: &AccountAddress, view_key: &ViewKey) -> bool {
    match secret_key_to_public_key(view_key) {
        Ok(public) => public == address.view_public,
        Err(_) => false,
    }
}

/// Authenticate and load a visible account.
///
/// `BadViewKey` if the key does not match the address; `NoSuchAccount` if the
/// account is absent or hidden.
pub fn open_account(
    reader: &StorageReader<'_>,
    address: &AccountAddress,
    view_key: &ViewKey,
) -> Expect<Account> {
    if !key_check(address, view_key) {
        return Err(LwsError::BadViewKey.into());
    }

    let (status, account) = reader.get_account(address)?;
    if is_hidden(status) {
        tracing::debug!(id = %account.id, "request for hidden account");
        return Err(LwsError::NoSuchAccount.into());
    }
    Ok(account)
}
