//! Registration and activation.
//!
//! Registration moves through `PendingValidation -> UserCreated -> InvitationIssued` and ends
//! either `Activated` (later, through [`RegistrationWorkflow::activate`]) or `RolledBack`. Input
//! validation and password hashing have no side effects. User creation and invitation
//! persistence are one store call. The activation email is the last step; if it cannot be sent
//! the user is deleted again.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    AppState,
    api::models::auth::RegisterRequest,
    auth::password,
    config::PasswordConfig,
    db::{
        UserStore,
        models::{
            invitations::{ActivationOutcome, InvitationCreateDBRequest},
            users::{UserCreateDBRequest, UserDBResponse},
        },
    },
    email::{EmailTemplate, Mailer, Recipient},
    errors::{Error, Result},
    types::{UserId, abbrev_uuid},
    workflow::saga::{Saga, Step},
};

/// Role given to every self-registered user
pub const DEFAULT_ROLE: &str = "user";

const MAX_USERNAME_CHARS: usize = 100;
const MAX_EMAIL_CHARS: usize = 255;

/// A completed registration. `token` is the plaintext invitation token and exists only here.
#[derive(Debug)]
pub struct Registration {
    pub user: UserDBResponse,
    pub token: String,
}

pub struct RegistrationWorkflow {
    users: Arc<dyn UserStore>,
    mailer: Arc<dyn Mailer>,
    password: PasswordConfig,
    invitation_expiry: Duration,
    frontend_url: String,
}

struct RegistrationContext {
    user: UserCreateDBRequest,
    invitation: InvitationCreateDBRequest,
    plaintext_token: String,
    created: Option<UserDBResponse>,
}

struct CreateUserWithInvitation {
    users: Arc<dyn UserStore>,
}

#[async_trait::async_trait]
impl Step<RegistrationContext> for CreateUserWithInvitation {
    fn name(&self) -> &'static str {
        "create_user"
    }

    async fn execute(&self, ctx: &mut RegistrationContext) -> Result<()> {
        let created = self.users.create_and_invite(&ctx.user, &ctx.invitation).await.map_err(|e| {
            match e.duplicate_user_field() {
                Some(field) => Error::AlreadyExists { field },
                None => Error::Database(e),
            }
        })?;
        ctx.created = Some(created);
        Ok(())
    }

    async fn compensate(&self, ctx: &mut RegistrationContext) -> Result<()> {
        let Some(created) = ctx.created.take() else {
            return Ok(());
        };
        self.users.delete(created.id).await?;
        info!(user_id = %abbrev_uuid(&created.id), "Rolled back registration");
        Ok(())
    }
}

struct SendActivationEmail {
    mailer: Arc<dyn Mailer>,
    frontend_url: String,
}

#[async_trait::async_trait]
impl Step<RegistrationContext> for SendActivationEmail {
    fn name(&self) -> &'static str {
        "send_activation_email"
    }

    async fn execute(&self, ctx: &mut RegistrationContext) -> Result<()> {
        let template = EmailTemplate::UserWelcome {
            username: ctx.user.username.clone(),
            activation_url: activation_url(&self.frontend_url, &ctx.plaintext_token),
        };
        let recipient = Recipient {
            email: ctx.user.email.clone(),
            name: Some(ctx.user.username.clone()),
        };

        self.mailer.send(&template, &recipient).await?;
        Ok(())
    }

    async fn compensate(&self, _ctx: &mut RegistrationContext) -> Result<()> {
        // A sent email cannot be recalled.
        Ok(())
    }
}

/// Link embedded in the welcome email
pub fn activation_url(frontend_url: &str, plaintext_token: &str) -> String {
    format!("{}/confirm/{plaintext_token}", frontend_url.trim_end_matches('/'))
}

/// Shape checks on a registration payload. No side effects.
pub fn validate(request: &RegisterRequest, policy: &PasswordConfig) -> Result<()> {
    let username = request.username.trim();
    if username.is_empty() {
        return Err(Error::BadRequest {
            message: "Username is required".to_string(),
        });
    }
    if username.chars().count() > MAX_USERNAME_CHARS {
        return Err(Error::BadRequest {
            message: format!("Username must be no more than {MAX_USERNAME_CHARS} characters"),
        });
    }

    let email = request.email.trim();
    if email.is_empty() {
        return Err(Error::BadRequest {
            message: "Email is required".to_string(),
        });
    }
    if email.chars().count() > MAX_EMAIL_CHARS {
        return Err(Error::BadRequest {
            message: format!("Email must be no more than {MAX_EMAIL_CHARS} characters"),
        });
    }
    if email.parse::<lettre::Address>().is_err() {
        return Err(Error::BadRequest {
            message: "Email address is not valid".to_string(),
        });
    }

    password::check_length(&request.password, policy)
}

impl RegistrationWorkflow {
    pub fn new(state: &AppState) -> Self {
        Self {
            users: state.users.clone(),
            mailer: state.mailer.clone(),
            password: state.config.auth.password.clone(),
            invitation_expiry: state.config.auth.invitation.expiry,
            frontend_url: state.config.frontend_url.clone(),
        }
    }

    /// Create an inactive user, issue an invitation and email its activation link.
    ///
    /// On success the plaintext token is returned to the caller and nowhere else. On any failure
    /// after the user row exists, the user is deleted before the error is returned.
    #[instrument(skip_all, err)]
    pub async fn register(&self, request: RegisterRequest) -> Result<Registration> {
        validate(&request, &self.password)?;

        let policy = self.password.clone();
        let plaintext_password = request.password;
        let password_hash = tokio::task::spawn_blocking(move || password::hash_password(&plaintext_password, &policy))
            .await
            .map_err(|e| Error::Internal {
                operation: format!("spawn password hashing task: {e}"),
            })??;

        let plaintext_token = password::generate_invitation_token();
        let expires_at = Utc::now() + self.invitation_expiry;

        let mut ctx = RegistrationContext {
            user: UserCreateDBRequest {
                id: Uuid::new_v4(),
                username: request.username.trim().to_string(),
                email: request.email.trim().to_string(),
                password_hash,
                role_name: DEFAULT_ROLE.to_string(),
            },
            invitation: InvitationCreateDBRequest {
                token_digest: password::digest_token(&plaintext_token),
                expires_at,
            },
            plaintext_token,
            created: None,
        };

        Saga::new()
            .step(CreateUserWithInvitation { users: self.users.clone() })
            .step(SendActivationEmail {
                mailer: self.mailer.clone(),
                frontend_url: self.frontend_url.clone(),
            })
            .run(&mut ctx)
            .await?;

        let user = ctx.created.ok_or_else(|| Error::Internal {
            operation: "complete registration: user missing after saga".to_string(),
        })?;
        info!(user_id = %abbrev_uuid(&user.id), "Registered user, awaiting activation");

        Ok(Registration {
            user,
            token: ctx.plaintext_token,
        })
    }

    /// Consume the invitation matching `plaintext_token` and activate its user, exactly once.
    #[instrument(skip_all, err)]
    pub async fn activate(&self, plaintext_token: &str) -> Result<UserId> {
        let digest = password::digest_token(plaintext_token);

        match self.users.activate(&digest, Utc::now()).await? {
            ActivationOutcome::Activated(user_id) => {
                info!(user_id = %abbrev_uuid(&user_id), "Activated user");
                Ok(user_id)
            }
            ActivationOutcome::Expired => Err(Error::TokenExpired),
            ActivationOutcome::Invalid => Err(Error::TokenInvalid),
        }
    }
}
