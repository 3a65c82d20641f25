//! Paginated account and role discovery over the SSO portal API.
//!
//! Accounts and roles arrive in provider pages; discovery follows the
//! continuation tokens to exhaustion and only ever returns a complete
//! catalog. The per-account role fan-out is bounded to stay under the
//! provider's rate limit.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::cancel::racing_cancel;
use crate::credentials::RoleCredentials;
use crate::error::{GangwayError, Result};

/// Number of role-list calls allowed in flight at once.
const DISCOVERY_CONCURRENCY: usize = 5;

/// An AWS account visible to the authenticated user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredAccount {
    /// Twelve-digit account identifier.
    pub account_id: String,
    /// Human-friendly account alias; may be empty.
    pub account_name: String,
    /// Email address registered for the account.
    pub email: String,
}

/// A role the user may assume within one account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredRole {
    /// Account the role belongs to.
    pub account_id: String,
    /// Role name within that account.
    pub role_name: String,
}

/// One (account, role) pair eligible to become a profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleBinding {
    /// The account the role was discovered under.
    pub account: DiscoveredAccount,
    /// The role itself.
    pub role: DiscoveredRole,
}

/// One page of the account list plus its continuation token.
#[derive(Debug, Clone, Default)]
pub struct AccountPage {
    /// Accounts on this page, in provider order.
    pub accounts: Vec<DiscoveredAccount>,
    /// Continuation token for the next page, if any remain.
    pub next_token: Option<String>,
}

/// One page of an account's role list plus its continuation token.
#[derive(Debug, Clone, Default)]
pub struct RolePage {
    /// Roles on this page, in provider order.
    pub roles: Vec<DiscoveredRole>,
    /// Continuation token for the next page, if any remain.
    pub next_token: Option<String>,
}

/// Transport abstraction for the SSO portal (role catalog) endpoints.
pub trait CatalogClient: Send + Sync {
    /// Fetch one page of the account list.
    fn list_accounts<'a>(
        &'a self,
        access_token: &'a str,
        next_token: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Result<AccountPage>> + Send + 'a>>;

    /// Fetch one page of the role list for an account.
    fn list_account_roles<'a>(
        &'a self,
        access_token: &'a str,
        account_id: &'a str,
        next_token: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Result<RolePage>> + Send + 'a>>;

    /// Fetch temporary credentials for an account/role pair.
    fn get_role_credentials<'a>(
        &'a self,
        access_token: &'a str,
        account_id: &'a str,
        role_name: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<RoleCredentials>> + Send + 'a>>;
}

/// Wrap a failure as a discovery error, letting cancellation through intact.
fn as_discovery(err: GangwayError, context: &str) -> GangwayError {
    match err {
        GangwayError::Cancelled => GangwayError::Cancelled,
        other => GangwayError::Discovery(format!("{context}: {other}")),
    }
}

/// Discover every account visible to the token.
///
/// Follows continuation tokens until the provider reports none remaining and
/// returns all pages as one ordered sequence. Any page failure fails the
/// whole call; no partial list is returned.
pub async fn list_all_accounts<C>(
    client: &C,
    access_token: &str,
    cancel: &CancellationToken,
) -> Result<Vec<DiscoveredAccount>>
where
    C: CatalogClient + ?Sized,
{
    let mut accounts = Vec::new();
    let mut next_token: Option<String> = None;
    loop {
        let page = racing_cancel(cancel, client.list_accounts(access_token, next_token.as_deref()))
            .await
            .map_err(|err| as_discovery(err, "failed to list accounts"))?;
        accounts.extend(page.accounts);
        match page.next_token {
            Some(token) => next_token = Some(token),
            None => break,
        }
    }
    log::debug!("discovered {} account(s)", accounts.len());
    Ok(accounts)
}

/// Discover every role available in one account, with the same pagination
/// contract as [`list_all_accounts`].
pub async fn list_all_account_roles<C>(
    client: &C,
    access_token: &str,
    account_id: &str,
    cancel: &CancellationToken,
) -> Result<Vec<DiscoveredRole>>
where
    C: CatalogClient + ?Sized,
{
    let mut roles = Vec::new();
    let mut next_token: Option<String> = None;
    loop {
        let page = racing_cancel(
            cancel,
            client.list_account_roles(access_token, account_id, next_token.as_deref()),
        )
        .await
        .map_err(|err| as_discovery(err, &format!("failed to list roles for account {account_id}")))?;
        roles.extend(page.roles);
        match page.next_token {
            Some(token) => next_token = Some(token),
            None => break,
        }
    }
    Ok(roles)
}

/// Fetch the role list for every account with a bounded fan-out.
///
/// At most five role-list calls are in flight at once, admitted through a
/// semaphore rather than a fixed worker pool. Completion order is
/// unspecified; results are written into their pre-allocated slot so the
/// flattened output enumerates accounts in submission order and, within each
/// account, roles in provider order. The first failure cancels all other
/// in-flight and not-yet-started fetches and becomes the overall error; no
/// partial catalog is ever returned.
pub async fn discover_role_bindings<C>(
    client: Arc<C>,
    access_token: &str,
    accounts: &[DiscoveredAccount],
    cancel: &CancellationToken,
) -> Result<Vec<RoleBinding>>
where
    C: CatalogClient + ?Sized + 'static,
{
    let semaphore = Arc::new(Semaphore::new(DISCOVERY_CONCURRENCY));
    let fan_out = cancel.child_token();
    let mut tasks: JoinSet<Result<(usize, Vec<DiscoveredRole>)>> = JoinSet::new();

    for (index, account) in accounts.iter().enumerate() {
        let client = Arc::clone(&client);
        let semaphore = Arc::clone(&semaphore);
        let access_token = access_token.to_string();
        let account_id = account.account_id.clone();
        let fan_out = fan_out.clone();
        tasks.spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|_| GangwayError::Cancelled)?;
            let roles =
                list_all_account_roles(client.as_ref(), &access_token, &account_id, &fan_out)
                    .await?;
            Ok((index, roles))
        });
    }

    let mut slots: Vec<Option<Vec<DiscoveredRole>>> = vec![None; accounts.len()];
    let mut failure: Option<GangwayError> = None;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok((index, roles))) => slots[index] = Some(roles),
            Ok(Err(err)) => {
                fan_out.cancel();
                tasks.abort_all();
                failure.get_or_insert(err);
            }
            Err(join_err) if join_err.is_cancelled() => {}
            Err(join_err) => {
                fan_out.cancel();
                tasks.abort_all();
                failure.get_or_insert(GangwayError::Discovery(format!(
                    "role discovery task failed: {join_err}"
                )));
            }
        }
    }
    if let Some(err) = failure {
        return Err(err);
    }

    let mut bindings = Vec::new();
    for (account, roles) in accounts.iter().zip(slots) {
        let roles = roles.ok_or_else(|| {
            GangwayError::Discovery(format!(
                "missing role results for account {}",
                account.account_id
            ))
        })?;
        for role in roles {
            bindings.push(RoleBinding {
                account: account.clone(),
                role,
            });
        }
    }
    Ok(bindings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Scriptable catalog fake: pages keyed by account, optional per-account
    /// delays and failures, call recording.
    #[derive(Default)]
    struct FakeCatalog {
        account_pages: Mutex<Vec<Result<AccountPage>>>,
        role_pages: Mutex<HashMap<String, Vec<Result<RolePage>>>>,
        delays: HashMap<String, Duration>,
        role_calls: Mutex<Vec<String>>,
    }

    impl FakeCatalog {
        fn with_account_pages(pages: Vec<Result<AccountPage>>) -> Self {
            Self {
                account_pages: Mutex::new(pages),
                ..Default::default()
            }
        }

        fn add_role_pages(&mut self, account_id: &str, pages: Vec<Result<RolePage>>) {
            self.role_pages
                .lock()
                .expect("role pages lock")
                .insert(account_id.to_string(), pages);
        }

        fn role_calls(&self) -> Vec<String> {
            self.role_calls.lock().expect("role calls lock").clone()
        }
    }

    impl CatalogClient for FakeCatalog {
        fn list_accounts<'a>(
            &'a self,
            _access_token: &'a str,
            _next_token: Option<&'a str>,
        ) -> Pin<Box<dyn Future<Output = Result<AccountPage>> + Send + 'a>> {
            Box::pin(async {
                let mut pages = self.account_pages.lock().expect("account pages lock");
                if pages.is_empty() {
                    return Ok(AccountPage::default());
                }
                pages.remove(0)
            })
        }

        fn list_account_roles<'a>(
            &'a self,
            _access_token: &'a str,
            account_id: &'a str,
            _next_token: Option<&'a str>,
        ) -> Pin<Box<dyn Future<Output = Result<RolePage>> + Send + 'a>> {
            Box::pin(async move {
                if let Some(delay) = self.delays.get(account_id) {
                    tokio::time::sleep(*delay).await;
                }
                self.role_calls
                    .lock()
                    .expect("role calls lock")
                    .push(account_id.to_string());
                let mut pages = self.role_pages.lock().expect("role pages lock");
                let queue = pages
                    .get_mut(account_id)
                    .unwrap_or_else(|| panic!("no scripted role pages for {account_id}"));
                queue.remove(0)
            })
        }

        fn get_role_credentials<'a>(
            &'a self,
            _access_token: &'a str,
            _account_id: &'a str,
            _role_name: &'a str,
        ) -> Pin<Box<dyn Future<Output = Result<RoleCredentials>> + Send + 'a>> {
            Box::pin(async { panic!("not used by discovery tests") })
        }
    }

    fn account(id: &str, name: &str) -> DiscoveredAccount {
        DiscoveredAccount {
            account_id: id.to_string(),
            account_name: name.to_string(),
            email: format!("root@{name}.example.com"),
        }
    }

    fn role(account_id: &str, name: &str) -> DiscoveredRole {
        DiscoveredRole {
            account_id: account_id.to_string(),
            role_name: name.to_string(),
        }
    }

    #[tokio::test]
    async fn two_page_account_list_is_assembled_in_order() {
        let catalog = FakeCatalog::with_account_pages(vec![
            Ok(AccountPage {
                accounts: vec![account("111111111111", "prod")],
                next_token: Some("page-2".to_string()),
            }),
            Ok(AccountPage {
                accounts: vec![account("222222222222", "dev")],
                next_token: None,
            }),
        ]);
        let cancel = CancellationToken::new();

        let accounts = list_all_accounts(&catalog, "token", &cancel)
            .await
            .expect("accounts");
        let ids: Vec<_> = accounts.iter().map(|a| a.account_id.as_str()).collect();
        assert_eq!(ids, vec!["111111111111", "222222222222"]);
    }

    #[tokio::test]
    async fn account_page_failure_returns_no_accounts() {
        let catalog = FakeCatalog::with_account_pages(vec![
            Ok(AccountPage {
                accounts: vec![account("111111111111", "prod")],
                next_token: Some("page-2".to_string()),
            }),
            Err(GangwayError::Transport("throttled".to_string())),
        ]);
        let cancel = CancellationToken::new();

        let err = list_all_accounts(&catalog, "token", &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, GangwayError::Discovery(_)));
        assert!(err.to_string().contains("failed to list accounts"));
    }

    #[tokio::test]
    async fn two_page_role_list_is_assembled_in_order() {
        let mut catalog = FakeCatalog::default();
        catalog.add_role_pages(
            "111111111111",
            vec![
                Ok(RolePage {
                    roles: vec![role("111111111111", "AdministratorAccess")],
                    next_token: Some("page-2".to_string()),
                }),
                Ok(RolePage {
                    roles: vec![role("111111111111", "ReadOnlyAccess")],
                    next_token: None,
                }),
            ],
        );
        let cancel = CancellationToken::new();

        let roles = list_all_account_roles(&catalog, "token", "111111111111", &cancel)
            .await
            .expect("roles");
        let names: Vec<_> = roles.iter().map(|r| r.role_name.as_str()).collect();
        assert_eq!(names, vec!["AdministratorAccess", "ReadOnlyAccess"]);
    }

    #[tokio::test(start_paused = true)]
    async fn fan_out_preserves_account_order_despite_completion_order() {
        let mut catalog = FakeCatalog::default();
        catalog.add_role_pages(
            "111111111111",
            vec![Ok(RolePage {
                roles: vec![role("111111111111", "Admin")],
                next_token: None,
            })],
        );
        catalog.add_role_pages(
            "222222222222",
            vec![Ok(RolePage {
                roles: vec![role("222222222222", "ReadOnly")],
                next_token: None,
            })],
        );
        // The first account's fetch finishes well after the second's.
        catalog
            .delays
            .insert("111111111111".to_string(), Duration::from_millis(250));

        let accounts = vec![
            account("111111111111", "prod"),
            account("222222222222", "dev"),
        ];
        let cancel = CancellationToken::new();

        let bindings = discover_role_bindings(Arc::new(catalog), "token", &accounts, &cancel)
            .await
            .expect("bindings");
        let order: Vec<_> = bindings
            .iter()
            .map(|b| b.role.account_id.as_str())
            .collect();
        assert_eq!(order, vec!["111111111111", "222222222222"]);
    }

    #[tokio::test]
    async fn flattened_bindings_keep_roles_in_provider_order() {
        let mut catalog = FakeCatalog::default();
        catalog.add_role_pages(
            "111111111111",
            vec![Ok(RolePage {
                roles: vec![role("111111111111", "Admin"), role("111111111111", "Audit")],
                next_token: None,
            })],
        );
        let accounts = vec![account("111111111111", "prod")];
        let cancel = CancellationToken::new();

        let bindings = discover_role_bindings(Arc::new(catalog), "token", &accounts, &cancel)
            .await
            .expect("bindings");
        let names: Vec<_> = bindings.iter().map(|b| b.role.role_name.as_str()).collect();
        assert_eq!(names, vec!["Admin", "Audit"]);
        assert!(bindings.iter().all(|b| b.account.account_id == b.role.account_id));
    }

    #[tokio::test(start_paused = true)]
    async fn first_role_failure_abandons_remaining_fetches() {
        let mut catalog = FakeCatalog::default();
        let mut accounts = Vec::new();
        for index in 0..7 {
            let id = format!("{index}{index}{index}111111111");
            if index == 0 {
                catalog.add_role_pages(
                    &id,
                    vec![Err(GangwayError::Transport("denied".to_string()))],
                );
            } else {
                catalog.delays.insert(id.clone(), Duration::from_secs(60));
                catalog.add_role_pages(
                    &id,
                    vec![Ok(RolePage {
                        roles: vec![role(&id, "Admin")],
                        next_token: None,
                    })],
                );
            }
            accounts.push(account(&id, &format!("acct-{index}")));
        }
        let catalog = Arc::new(catalog);
        let cancel = CancellationToken::new();

        let err = discover_role_bindings(Arc::clone(&catalog), "token", &accounts, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, GangwayError::Discovery(_)));

        // Only calls admitted before the failure may have run; the accounts
        // still queued behind the admission gate never issued a call.
        let called: HashSet<_> = catalog.role_calls().into_iter().collect();
        assert!(called.len() <= DISCOVERY_CONCURRENCY);
    }

    #[tokio::test]
    async fn pre_cancelled_token_aborts_discovery() {
        let catalog = Arc::new(FakeCatalog::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let accounts = vec![account("111111111111", "prod")];
        let err = discover_role_bindings(catalog, "token", &accounts, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, GangwayError::Cancelled));
    }

    #[tokio::test]
    async fn no_accounts_yields_no_bindings() {
        let catalog = Arc::new(FakeCatalog::default());
        let cancel = CancellationToken::new();
        let bindings = discover_role_bindings(catalog, "token", &[], &cancel)
            .await
            .expect("bindings");
        assert!(bindings.is_empty());
    }
}
