use crate::Role;

/// An interactive role prompt.
///
/// Used when an assertion offers more than one role and none of them is the configured default.
/// The trait is implemented for async functions taking the offered roles and returning
/// `Result<Option<Role>, E>`, where `None` means the user declined to choose:
///
/// ```
/// use std::convert::Infallible;
///
/// use aws_saml_flow::{Role, RolePrompt};
///
/// fn first_role() -> impl RolePrompt {
///     |roles: Vec<Role>| async move { Ok::<_, Infallible>(roles.into_iter().next()) }
/// }
/// ```
pub trait RolePrompt: Clone + Send + Sync {
    /// The future returned by the prompt.
    type Future: std::future::Future<Output = Result<Option<Role>, Self::Error>> + Send;

    /// An error that could occur when attempting to prompt.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Ask the user to choose one of `roles`.
    fn choose(self, roles: Vec<Role>) -> Self::Future;
}

impl<F, Fut, E> RolePrompt for F
where
    F: FnOnce(Vec<Role>) -> Fut + Clone + Send + Sync,
    Fut: std::future::Future<Output = Result<Option<Role>, E>> + Send,
    E: std::error::Error + Send + Sync + 'static,
{
    type Future = Fut;
    type Error = E;

    fn choose(self, roles: Vec<Role>) -> Fut {
        self(roles)
    }
}

/// Pick a role from `roles`.
///
/// A single role is returned as-is, and `default_role_arn` is returned if it is offered. Otherwise
/// the choice is left to `prompt`.
///
/// # Errors
///
/// Returns an error if there are no roles, or if prompting fails, is cancelled, or returns a role
/// that wasn't offered.
pub async fn select_role<P: RolePrompt>(
    roles: &[Role],
    default_role_arn: Option<&str>,
    prompt: P,
) -> Result<Role, SelectionError<P::Error>> {
    match roles {
        [] => return Err(SelectionError::Empty),
        [role] => return Ok(role.clone()),
        _ => {}
    }

    if let Some(role) = default_role_arn
        .filter(|arn| !arn.is_empty())
        .and_then(|arn| roles.iter().find(|role| role.role_arn == arn))
    {
        return Ok(role.clone());
    }

    match prompt.choose(roles.to_vec()).await {
        Ok(Some(role)) if roles.contains(&role) => Ok(role),
        Ok(Some(role)) => Err(SelectionError::UnknownRole(role.role_arn)),
        Ok(None) => Err(SelectionError::Cancelled),
        Err(error) => Err(SelectionError::Prompt(error)),
    }
}

/// An error choosing a role.
#[allow(clippy::module_name_repetitions)]
#[derive(Debug, thiserror::Error)]
pub enum SelectionError<P: std::error::Error + Send + Sync + 'static> {
    /// There were no roles to choose from.
    #[error("no roles to choose from")]
    Empty,

    /// The user declined to choose a role.
    #[error("role selection was cancelled")]
    Cancelled,

    /// The prompt chose a role that wasn't offered.
    #[error("role {0} was not offered by the identity provider")]
    UnknownRole(String),

    /// The prompt failed.
    #[error("role prompt failed: {0}")]
    Prompt(#[source] P),
}

#[cfg(test)]
mod tests {
    use std::{
        convert::Infallible,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
    };

    use super::*;

    fn role(name: &str) -> Role {
        Role {
            role_arn: format!("arn:aws:iam::111111111111:role/{name}"),
            principal_arn: "arn:aws:iam::111111111111:saml-provider/Idp".to_string(),
        }
    }

    fn counting_prompt(calls: Arc<AtomicUsize>, choice: Option<Role>) -> impl RolePrompt {
        move |_: Vec<Role>| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, Infallible>(choice)
        }
    }

    #[tokio::test]
    async fn single_role_is_chosen_without_prompting() {
        let calls = Arc::new(AtomicUsize::new(0));
        let only = role("Only");
        let selected = select_role(
            &[only.clone()],
            Some("arn:aws:iam::111111111111:role/Other"),
            counting_prompt(calls.clone(), None),
        )
        .await
        .unwrap();
        assert_eq!(selected, only);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn default_role_is_chosen_without_prompting() {
        let calls = Arc::new(AtomicUsize::new(0));
        let roles = [role("A"), role("B")];
        let selected = select_role(
            &roles,
            Some(roles[1].role_arn.as_str()),
            counting_prompt(calls.clone(), None),
        )
        .await
        .unwrap();
        assert_eq!(selected, roles[1]);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unmatched_default_prompts() {
        let calls = Arc::new(AtomicUsize::new(0));
        let roles = [role("A"), role("B")];
        let selected = select_role(
            &roles,
            Some("arn:aws:iam::111111111111:role/C"),
            counting_prompt(calls.clone(), Some(roles[0].clone())),
        )
        .await
        .unwrap();
        assert_eq!(selected, roles[0]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_default_prompts() {
        let calls = Arc::new(AtomicUsize::new(0));
        let roles = [role("A"), role("B")];
        select_role(
            &roles,
            Some(""),
            counting_prompt(calls.clone(), Some(roles[1].clone())),
        )
        .await
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancelled_prompt() {
        let calls = Arc::new(AtomicUsize::new(0));
        let result =
            select_role(&[role("A"), role("B")], None, counting_prompt(calls, None)).await;
        assert!(matches!(result, Err(SelectionError::Cancelled)));
    }

    #[tokio::test]
    async fn prompt_must_choose_an_offered_role() {
        let calls = Arc::new(AtomicUsize::new(0));
        let result = select_role(
            &[role("A"), role("B")],
            None,
            counting_prompt(calls, Some(role("C"))),
        )
        .await;
        assert!(matches!(
            result,
            Err(SelectionError::UnknownRole(arn)) if arn.ends_with("role/C")
        ));
    }

    #[tokio::test]
    async fn prompt_errors_are_preserved() {
        let result = select_role(&[role("A"), role("B")], None, |_: Vec<Role>| async move {
            Err::<Option<Role>, _>(std::io::Error::new(std::io::ErrorKind::Other, "no tty"))
        })
        .await;
        match result {
            Err(SelectionError::Prompt(error)) => assert_eq!(error.to_string(), "no tty"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn no_roles() {
        let calls = Arc::new(AtomicUsize::new(0));
        let result = select_role(&[], None, counting_prompt(calls, None)).await;
        assert!(matches!(result, Err(SelectionError::Empty)));
    }
}
