//! Deployment plan synthesis.
//!
//! A [`StackPlan`] declares every resource the pseudonymization service needs
//! and the permissions wiring between them. It can only be synthesized from a
//! [`BuildArtifact`], so no resource references an untested executable.

use std::{collections::BTreeMap, path::PathBuf};

use common::{routes::cors, Operation, Profile};
use serde::Serialize;

use crate::build::BuildArtifact;

/// Alias of the deployment's single master key.
pub const MASTER_KEY_ALIAS: &str = "alias/fpe-master-key";
/// Logical id of the master key; other resources reference its ARN through it.
pub const MASTER_KEY_LOGICAL_ID: &str = "FpeMasterKey";
pub const FUNCTION_LOGICAL_ID: &str = "FpeFunction";
pub const USER_POOL_LOGICAL_ID: &str = "FpeUserPool";
pub const USER_POOL_CLIENT_LOGICAL_ID: &str = "FpeUserPoolClient";
pub const API_LOGICAL_ID: &str = "FpeHttpApi";
/// Secret holding the hex AES key of the minimal profile.
pub const STATIC_KEY_SECRET_NAME: &str = "/secret/fpe/static-key";

const SECRET_ACTIONS: [&str; 3] = [
    "secretsmanager:CreateSecret",
    "secretsmanager:DeleteSecret",
    "secretsmanager:GetSecretValue",
];
const MASTER_KEY_ACTIONS: [&str; 5] = [
    "kms:Encrypt",
    "kms:Decrypt",
    "kms:ReEncrypt*",
    "kms:GenerateDataKey*",
    "kms:DescribeKey",
];

/// Inputs that are not derived from the artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackSettings {
    pub stack_name: String,
    pub profile: Profile,
    pub tweak: String,
    pub dek_secret_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RemovalPolicy {
    /// Deleted with the stack, no recovery window.
    Destroy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MasterKeySpec {
    pub logical_id: String,
    pub alias: String,
    pub rotation_enabled: bool,
    pub removal: RemovalPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionSpec {
    pub logical_id: String,
    pub runtime: String,
    /// Entry-point file name inside the artifact bundle.
    pub handler: String,
    pub artifact: PathBuf,
    pub environment: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionGrant {
    pub principal: String,
    pub actions: Vec<String>,
    pub resource: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordPolicy {
    pub min_length: u8,
    pub require_lowercase: bool,
    pub require_uppercase: bool,
    pub require_digits: bool,
    pub require_symbols: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPoolSpec {
    pub logical_id: String,
    pub self_sign_up_enabled: bool,
    pub sign_in_aliases: Vec<String>,
    pub auto_verify: Vec<String>,
    pub password_policy: PasswordPolicy,
    pub account_recovery: String,
    pub removal: RemovalPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPoolClientSpec {
    pub logical_id: String,
    pub user_pool: String,
    pub auth_flows: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizerSpec {
    pub name: String,
    pub user_pool: String,
    pub client: String,
    pub identity_source: String,
}

/// Identity provider and the token authorizer in front of every route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentitySpec {
    pub user_pool: UserPoolSpec,
    pub client: UserPoolClientSpec,
    pub authorizer: AuthorizerSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteSpec {
    pub method: String,
    pub path: String,
    pub integration: String,
    pub authorized: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CorsSpec {
    pub allow_headers: Vec<String>,
    pub allow_methods: Vec<String>,
    pub allow_origins: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiSpec {
    pub logical_id: String,
    pub routes: Vec<RouteSpec>,
    pub cors: CorsSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StackPlan {
    pub stack_name: String,
    pub profile: Profile,
    pub master_keys: Vec<MasterKeySpec>,
    pub function: FunctionSpec,
    pub grants: Vec<PermissionGrant>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<IdentitySpec>,
    pub api: ApiSpec,
    pub outputs: BTreeMap<String, String>,
}

fn attr(logical_id: &str, attribute: &str) -> String {
    format!("${{{logical_id}.{attribute}}}")
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_owned()).collect()
}

impl StackPlan {
    pub fn synthesize(settings: &StackSettings, artifact: &BuildArtifact) -> Self {
        let profile = settings.profile;
        let master_key = MasterKeySpec {
            logical_id: MASTER_KEY_LOGICAL_ID.into(),
            alias: MASTER_KEY_ALIAS.into(),
            rotation_enabled: true,
            removal: RemovalPolicy::Destroy,
        };
        let master_key_arn = attr(MASTER_KEY_LOGICAL_ID, "Arn");

        let mut environment = BTreeMap::from([
            ("FPE_PROFILE".to_owned(), profile.to_string()),
            ("FPE_TWEAK".to_owned(), settings.tweak.clone()),
        ]);
        if profile.uses_dek() {
            environment.insert("FPE_MASTER_KEY_ARN".into(), master_key_arn.clone());
            environment.insert("FPE_DEK_SECRET_NAME".into(), settings.dek_secret_name.clone());
        } else {
            environment.insert(
                "FPE_STATIC_KEY".into(),
                format!("{{{{resolve:secretsmanager:{STATIC_KEY_SECRET_NAME}}}}}"),
            );
        }

        let identity = profile.requires_authorizer().then(|| {
            environment.insert("AUTH_ISSUER".into(), attr(USER_POOL_LOGICAL_ID, "ProviderURL"));
            environment.insert(
                "AUTH_CLIENT_IDS".into(),
                attr(USER_POOL_CLIENT_LOGICAL_ID, "ClientId"),
            );
            environment.insert(
                "AUTH_JWKS_URL".into(),
                format!("{}/.well-known/jwks.json", attr(USER_POOL_LOGICAL_ID, "ProviderURL")),
            );
            identity_spec()
        });

        let function = FunctionSpec {
            logical_id: FUNCTION_LOGICAL_ID.into(),
            runtime: "provided.al2023".into(),
            handler: artifact.name().as_str().into(),
            artifact: artifact.path().to_path_buf(),
            environment,
        };

        let mut grants = vec![PermissionGrant {
            principal: FUNCTION_LOGICAL_ID.into(),
            actions: strings(&MASTER_KEY_ACTIONS),
            resource: master_key_arn,
        }];
        if profile.uses_dek() {
            grants.push(PermissionGrant {
                principal: FUNCTION_LOGICAL_ID.into(),
                actions: strings(&SECRET_ACTIONS),
                resource: format!("arn:aws:secretsmanager:*:*:secret:{}*", settings.dek_secret_name),
            });
        }

        let authorized = profile.requires_authorizer();
        let api = ApiSpec {
            logical_id: API_LOGICAL_ID.into(),
            routes: profile
                .operations()
                .iter()
                .map(|op: &Operation| RouteSpec {
                    method: "POST".into(),
                    path: op.path().into(),
                    integration: FUNCTION_LOGICAL_ID.into(),
                    authorized,
                })
                .collect(),
            cors: CorsSpec {
                allow_headers: strings(&cors::ALLOWED_HEADERS),
                allow_methods: strings(&cors::ALLOWED_METHODS),
                allow_origins: strings(&cors::ALLOWED_ORIGINS),
            },
        };

        let mut outputs = BTreeMap::from([
            ("FpeMasterKeyArn".to_owned(), attr(MASTER_KEY_LOGICAL_ID, "Arn")),
            ("ApiUrlOutput".to_owned(), attr(API_LOGICAL_ID, "ApiEndpoint")),
        ]);
        if identity.is_some() {
            outputs.insert("UserPoolId".into(), attr(USER_POOL_LOGICAL_ID, "UserPoolId"));
            outputs.insert(
                "UserPoolClientId".into(),
                attr(USER_POOL_CLIENT_LOGICAL_ID, "ClientId"),
            );
        }

        Self {
            stack_name: settings.stack_name.clone(),
            profile,
            master_keys: vec![master_key],
            function,
            grants,
            identity,
            api,
            outputs,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn identity_spec() -> IdentitySpec {
    IdentitySpec {
        user_pool: UserPoolSpec {
            logical_id: USER_POOL_LOGICAL_ID.into(),
            self_sign_up_enabled: true,
            sign_in_aliases: strings(&["email"]),
            auto_verify: strings(&["email"]),
            password_policy: PasswordPolicy {
                min_length: 8,
                require_lowercase: true,
                require_uppercase: true,
                require_digits: true,
                require_symbols: true,
            },
            account_recovery: "EMAIL_ONLY".into(),
            removal: RemovalPolicy::Destroy,
        },
        client: UserPoolClientSpec {
            logical_id: USER_POOL_CLIENT_LOGICAL_ID.into(),
            user_pool: USER_POOL_LOGICAL_ID.into(),
            auth_flows: strings(&[
                "ADMIN_USER_PASSWORD_AUTH",
                "USER_PASSWORD_AUTH",
                "CUSTOM_AUTH",
                "USER_SRP_AUTH",
            ]),
        },
        authorizer: AuthorizerSpec {
            name: "FpeUserPoolAuthorizer".into(),
            user_pool: USER_POOL_LOGICAL_ID.into(),
            client: USER_POOL_CLIENT_LOGICAL_ID.into(),
            identity_source: "$request.header.Authorization".into(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::{ArtifactName, BuildPath};

    fn artifact(dir: &tempfile::TempDir, name: ArtifactName) -> BuildArtifact {
        let path = dir.path().join(name.as_str());
        std::fs::write(&path, b"\x7fELF").unwrap();
        BuildArtifact::verified(path, name, BuildPath::Local).unwrap()
    }

    fn settings(profile: Profile) -> StackSettings {
        StackSettings {
            stack_name: "FpePseudonymizationStack".into(),
            profile,
            tweak: "D8E7920AFA330A73".into(),
            dek_secret_name: "/secret/fpe/dek".into(),
        }
    }

    #[test]
    fn exactly_one_rotating_master_key() {
        let dir = tempfile::tempdir().unwrap();
        for profile in [Profile::Full, Profile::Minimal] {
            let plan = StackPlan::synthesize(&settings(profile), &artifact(&dir, ArtifactName::Bootstrap));
            assert_eq!(plan.master_keys.len(), 1);
            assert!(plan.master_keys[0].rotation_enabled);
            assert_eq!(plan.master_keys[0].removal, RemovalPolicy::Destroy);
            assert_eq!(plan.master_keys[0].alias, MASTER_KEY_ALIAS);
        }
    }

    #[test]
    fn full_profile_wires_dek_identity_and_gated_routes() {
        let dir = tempfile::tempdir().unwrap();
        let plan = StackPlan::synthesize(&settings(Profile::Full), &artifact(&dir, ArtifactName::Bootstrap));

        assert_eq!(plan.function.handler, "bootstrap");
        let env = &plan.function.environment;
        assert_eq!(env["FPE_PROFILE"], "full");
        assert_eq!(env["FPE_MASTER_KEY_ARN"], "${FpeMasterKey.Arn}");
        assert_eq!(env["FPE_DEK_SECRET_NAME"], "/secret/fpe/dek");
        assert!(env.contains_key("AUTH_JWKS_URL"));
        assert!(!env.contains_key("FPE_STATIC_KEY"));

        assert_eq!(plan.grants.len(), 2);
        let secret = &plan.grants[1];
        assert!(secret.actions.contains(&"secretsmanager:DeleteSecret".to_owned()));
        assert!(secret.resource.contains("/secret/fpe/dek"));

        let identity = plan.identity.as_ref().unwrap();
        assert_eq!(identity.authorizer.identity_source, "$request.header.Authorization");
        assert_eq!(identity.user_pool.password_policy.min_length, 8);

        assert_eq!(plan.api.routes.len(), 4);
        assert!(plan.api.routes.iter().all(|r| r.authorized && r.method == "POST"));
        assert_eq!(plan.api.cors.allow_methods, ["POST"]);

        let outputs: Vec<_> = plan.outputs.keys().map(String::as_str).collect();
        assert_eq!(
            outputs,
            ["ApiUrlOutput", "FpeMasterKeyArn", "UserPoolClientId", "UserPoolId"]
        );
    }

    #[test]
    fn minimal_profile_is_open_with_static_key() {
        let dir = tempfile::tempdir().unwrap();
        let plan = StackPlan::synthesize(&settings(Profile::Minimal), &artifact(&dir, ArtifactName::Main));

        assert_eq!(plan.function.handler, "main");
        assert!(plan.identity.is_none());
        assert_eq!(plan.grants.len(), 1);
        assert!(plan.function.environment["FPE_STATIC_KEY"].starts_with("{{resolve:secretsmanager:"));
        let paths: Vec<_> = plan.api.routes.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, ["/encrypt", "/decrypt"]);
        assert!(plan.api.routes.iter().all(|r| !r.authorized));
        assert_eq!(plan.outputs.len(), 2);
    }

    #[test]
    fn plan_serialises_without_identity_for_minimal() {
        let dir = tempfile::tempdir().unwrap();
        let plan = StackPlan::synthesize(&settings(Profile::Minimal), &artifact(&dir, ArtifactName::Bootstrap));
        let json: serde_json::Value = serde_json::from_str(&plan.to_json().unwrap()).unwrap();
        assert!(json.get("identity").is_none());
        assert_eq!(json["masterKeys"][0]["rotationEnabled"], true);
        assert_eq!(json["profile"], "minimal");
    }
}
