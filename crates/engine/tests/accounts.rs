mod common;

use chrono::Duration;
use common::{first_code, Harness, ADMIN_EMAIL, PASSWORD};
use gazette_core::testing::RecordingMailer;
use serde_json::json;

const ME: &str = "{ me { id username } }";

const LOGIN: &str = "mutation Login($email: String!, $password: String!) {
    login(email: $email, password: $password) { user { id } accessToken refreshToken }
}";

#[tokio::test]
async fn test_register_returns_user_and_two_credentials() {
    let h = Harness::new();
    let body = h
        .json(
            "mutation { register(input: {username: \"bob\", email: \"b@x.com\", password: \"Secret123!\"}) {
                 user { username role emailVerified } accessToken refreshToken
             } }",
            json!({}),
            None,
        )
        .await;

    assert!(body.get("errors").is_none(), "{body}");
    let payload = &body["data"]["register"];
    assert_eq!(payload["user"]["username"], "bob");
    assert_eq!(payload["user"]["role"], "user");
    assert_eq!(payload["user"]["emailVerified"], false);

    let access = payload["accessToken"].as_str().unwrap();
    let refresh = payload["refreshToken"].as_str().unwrap();
    assert!(!access.is_empty());
    assert!(!refresh.is_empty());
    assert_ne!(access, refresh);
}

#[tokio::test]
async fn test_registered_access_token_identifies_the_caller() {
    let h = Harness::new();
    let bob = h.register("bob", "b@x.com").await;
    let body = h.json(ME, json!({}), Some(&bob.access)).await;
    assert_eq!(body["data"]["me"]["id"], bob.user_id);
    assert_eq!(body["data"]["me"]["username"], "bob");
}

#[tokio::test]
async fn test_duplicate_email_is_a_validation_error() {
    let h = Harness::new();
    h.register("bob", "b@x.com").await;
    let body = h
        .json(
            "mutation { register(input: {username: \"bobby\", email: \"B@X.com\", password: \"Secret123!\"}) { accessToken } }",
            json!({}),
            None,
        )
        .await;
    assert_eq!(body["data"], json!(null));
    assert_eq!(first_code(&body), "ValidationError");
    assert_eq!(body["errors"][0]["extensions"]["field"], "email");
    assert_eq!(body["errors"][0]["path"], json!(["register"]));
}

#[tokio::test]
async fn test_weak_password_names_the_field() {
    let h = Harness::new();
    let body = h
        .json(
            "mutation { register(input: {username: \"bob\", email: \"b@x.com\", password: \"password\"}) { accessToken } }",
            json!({}),
            None,
        )
        .await;
    assert_eq!(first_code(&body), "ValidationError");
    assert_eq!(body["errors"][0]["extensions"]["field"], "password");
}

#[tokio::test]
async fn test_login_with_wrong_password_is_an_invalid_credential() {
    let h = Harness::new();
    h.register("bob", "b@x.com").await;
    let body = h
        .json(LOGIN, json!({"email": "b@x.com", "password": "Wrong123!"}), None)
        .await;
    assert_eq!(body["data"], json!(null));
    assert_eq!(first_code(&body), "InvalidCredential");

    let unknown = h
        .json(LOGIN, json!({"email": "nobody@x.com", "password": PASSWORD}), None)
        .await;
    assert_eq!(first_code(&unknown), "InvalidCredential");
    assert_eq!(unknown["errors"][0]["message"], body["errors"][0]["message"]);
}

#[tokio::test]
async fn test_login_succeeds_with_any_email_casing() {
    let h = Harness::new();
    let bob = h.register("bob", "b@x.com").await;
    let body = h
        .json(LOGIN, json!({"email": " B@X.COM", "password": PASSWORD}), None)
        .await;
    assert_eq!(body["data"]["login"]["user"]["id"], bob.user_id);
}

#[tokio::test]
async fn test_logout_revokes_access_and_refresh_credentials() {
    let h = Harness::new();
    let bob = h.register("bob", "b@x.com").await;

    let body = h.json("mutation { logout }", json!({}), Some(&bob.access)).await;
    assert_eq!(body["data"]["logout"], true);

    let me = h.json(ME, json!({}), Some(&bob.access)).await;
    assert_eq!(me["data"]["me"], json!(null));

    let refresh = h
        .json(
            "mutation($t: String!) { refreshToken(refreshToken: $t) { accessToken } }",
            json!({"t": bob.refresh}),
            None,
        )
        .await;
    assert_eq!(first_code(&refresh), "InvalidCredential");
}

#[tokio::test]
async fn test_logout_requires_authentication() {
    let h = Harness::new();
    let body = h.json("mutation { logout }", json!({}), None).await;
    assert_eq!(body["data"], json!(null));
    assert_eq!(first_code(&body), "Unauthenticated");
}

#[tokio::test]
async fn test_refresh_issues_a_working_access_credential() {
    let h = Harness::new();
    let bob = h.register("bob", "b@x.com").await;
    let body = h
        .json(
            "mutation($t: String!) { refreshToken(refreshToken: $t) { accessToken } }",
            json!({"t": bob.refresh}),
            None,
        )
        .await;
    let access = body["data"]["refreshToken"]["accessToken"].as_str().unwrap();
    let me = h.json(ME, json!({}), Some(access)).await;
    assert_eq!(me["data"]["me"]["id"], bob.user_id);
}

#[tokio::test]
async fn test_access_credential_is_not_a_refresh_credential() {
    let h = Harness::new();
    let bob = h.register("bob", "b@x.com").await;
    let body = h
        .json(
            "mutation($t: String!) { refreshToken(refreshToken: $t) { accessToken } }",
            json!({"t": bob.access}),
            None,
        )
        .await;
    assert_eq!(first_code(&body), "InvalidCredential");
}

#[tokio::test]
async fn test_access_credential_expires() {
    let h = Harness::new();
    let bob = h.register("bob", "b@x.com").await;
    h.clock.advance(Duration::seconds(15 * 60 + 1));
    let me = h.json(ME, json!({}), Some(&bob.access)).await;
    assert_eq!(me["data"]["me"], json!(null));
}

#[tokio::test]
async fn test_password_change_revokes_sessions() {
    let h = Harness::new();
    let bob = h.register("bob", "b@x.com").await;

    let body = h
        .json(
            "mutation { changePassword(currentPassword: \"Secret123!\", newPassword: \"Changed456!\") }",
            json!({}),
            Some(&bob.access),
        )
        .await;
    assert_eq!(body["data"]["changePassword"], true, "{body}");

    let me = h.json(ME, json!({}), Some(&bob.access)).await;
    assert_eq!(me["data"]["me"], json!(null));

    let old = h
        .json(LOGIN, json!({"email": "b@x.com", "password": PASSWORD}), None)
        .await;
    assert_eq!(first_code(&old), "InvalidCredential");
    let new = h
        .json(LOGIN, json!({"email": "b@x.com", "password": "Changed456!"}), None)
        .await;
    assert_eq!(new["data"]["login"]["user"]["id"], bob.user_id);
}

#[tokio::test]
async fn test_change_password_checks_the_current_password() {
    let h = Harness::new();
    let bob = h.register("bob", "b@x.com").await;
    let body = h
        .json(
            "mutation { changePassword(currentPassword: \"Nope1234!\", newPassword: \"Changed456!\") }",
            json!({}),
            Some(&bob.access),
        )
        .await;
    assert_eq!(first_code(&body), "InvalidCredential");
    let me = h.json(ME, json!({}), Some(&bob.access)).await;
    assert_eq!(me["data"]["me"]["id"], bob.user_id);
}

#[tokio::test]
async fn test_password_reset_credential_is_single_use() {
    let h = Harness::new();
    let bob = h.register("bob", "b@x.com").await;

    let body = h
        .json("mutation { requestPasswordReset(email: \"b@x.com\") }", json!({}), None)
        .await;
    assert_eq!(body["data"]["requestPasswordReset"], true);
    let token = h.mailed_token("b@x.com");

    let reset = "mutation($t: String!, $p: String!) { resetPassword(token: $t, newPassword: $p) }";
    let first = h
        .json(reset, json!({"t": token, "p": "Reset4567!"}), None)
        .await;
    assert_eq!(first["data"]["resetPassword"], true, "{first}");

    let second = h
        .json(reset, json!({"t": token, "p": "Again4567!"}), None)
        .await;
    assert_eq!(first_code(&second), "InvalidCredential");

    let me = h.json(ME, json!({}), Some(&bob.access)).await;
    assert_eq!(me["data"]["me"], json!(null));
    let login = h
        .json(LOGIN, json!({"email": "b@x.com", "password": "Reset4567!"}), None)
        .await;
    assert_eq!(login["data"]["login"]["user"]["id"], bob.user_id);
}

#[tokio::test]
async fn test_password_reset_request_does_not_reveal_accounts() {
    let h = Harness::new();
    let before = h.mailer.sent().len();
    let body = h
        .json("mutation { requestPasswordReset(email: \"ghost@x.com\") }", json!({}), None)
        .await;
    assert_eq!(body, json!({"data": {"requestPasswordReset": true}}));
    assert_eq!(h.mailer.sent().len(), before);
}

#[tokio::test]
async fn test_email_verification_flow() {
    let h = Harness::new();
    let bob = h.register("bob", "b@x.com").await;
    let token = h.mailed_token("b@x.com");

    let body = h
        .json(
            "mutation($t: String!) { verifyEmail(token: $t) { id emailVerified } }",
            json!({"t": token}),
            None,
        )
        .await;
    assert_eq!(body["data"]["verifyEmail"]["id"], bob.user_id);
    assert_eq!(body["data"]["verifyEmail"]["emailVerified"], true);
}

#[tokio::test]
async fn test_verification_credential_holds_only_for_the_mailed_address() {
    let h = Harness::new();
    let bob = h.register("bob", "b@x.com").await;
    let stale = h.mailed_token("b@x.com");
    let changed = h
        .json(
            "mutation { updateProfile(email: \"typo@x.com\") { email } }",
            json!({}),
            Some(&bob.access),
        )
        .await;
    assert_eq!(changed["data"]["updateProfile"]["email"], "typo@x.com");

    let verify = "mutation($t: String!) { verifyEmail(token: $t) { emailVerified } }";
    let refused = h.json(verify, json!({"t": stale}), None).await;
    assert_eq!(first_code(&refused), "InvalidCredential");
    let me = h
        .json("{ me { emailVerified } }", json!({}), Some(&bob.access))
        .await;
    assert_eq!(me["data"]["me"]["emailVerified"], false);

    h.json("mutation { requestEmailVerification }", json!({}), Some(&bob.access))
        .await;
    let fresh = h.mailed_token("typo@x.com");
    let accepted = h.json(verify, json!({"t": fresh}), None).await;
    assert_eq!(accepted["data"]["verifyEmail"]["emailVerified"], true);
}

#[tokio::test]
async fn test_verification_credential_cannot_log_in() {
    let h = Harness::new();
    h.register("bob", "b@x.com").await;
    let token = h.mailed_token("b@x.com");
    let me = h.json(ME, json!({}), Some(&token)).await;
    assert_eq!(me["data"]["me"], json!(null));
}

#[tokio::test]
async fn test_mail_failure_does_not_fail_registration() {
    let h = Harness::with_mailer(RecordingMailer::failing());
    let bob = h.register("bob", "b@x.com").await;
    assert!(!bob.access.is_empty());
    let body = h
        .json("mutation { requestEmailVerification }", json!({}), Some(&bob.access))
        .await;
    assert_eq!(body["data"]["requestEmailVerification"], true);
}

#[tokio::test]
async fn test_configured_admin_email_registers_an_admin() {
    let h = Harness::new();
    let admin = h.register("root", ADMIN_EMAIL).await;
    let body = h.json("{ me { role } }", json!({}), Some(&admin.access)).await;
    assert_eq!(body["data"]["me"]["role"], "admin");
}

#[tokio::test]
async fn test_role_change_applies_to_the_next_request() {
    let h = Harness::new();
    let admin = h.register("root", ADMIN_EMAIL).await;
    let bob = h.register("bob", "b@x.com").await;

    let forbidden = h
        .json("{ cacheStats { hits } }", json!({}), Some(&bob.access))
        .await;
    assert_eq!(first_code(&forbidden), "Forbidden");

    let body = h
        .json(
            "mutation($id: ID!) { setUserRole(id: $id, role: \"ADMIN\") { role } }",
            json!({"id": bob.user_id}),
            Some(&admin.access),
        )
        .await;
    assert_eq!(body["data"]["setUserRole"]["role"], "admin");

    let allowed = h
        .json("{ cacheStats { hits } }", json!({}), Some(&bob.access))
        .await;
    assert!(allowed.get("errors").is_none(), "{allowed}");
}

#[tokio::test]
async fn test_update_profile_checks_uniqueness_and_resets_verification() {
    let h = Harness::new();
    let bob = h.register("bob", "b@x.com").await;
    h.register("carol", "c@x.com").await;

    let taken = h
        .json(
            "mutation { updateProfile(username: \"carol\") { username } }",
            json!({}),
            Some(&bob.access),
        )
        .await;
    assert_eq!(first_code(&taken), "ValidationError");
    assert_eq!(taken["errors"][0]["extensions"]["field"], "username");

    let body = h
        .json(
            "mutation { updateProfile(email: \"new@x.com\") { email emailVerified } }",
            json!({}),
            Some(&bob.access),
        )
        .await;
    assert_eq!(body["data"]["updateProfile"]["email"], "new@x.com");
    assert_eq!(body["data"]["updateProfile"]["emailVerified"], false);
}

#[tokio::test]
async fn test_email_is_visible_to_self_and_admins_only() {
    let h = Harness::new();
    let admin = h.register("root", ADMIN_EMAIL).await;
    let bob = h.register("bob", "b@x.com").await;
    let carol = h.register("carol", "c@x.com").await;

    let query = "query($id: ID!) { user(id: $id) { username email } }";
    let vars = json!({"id": bob.user_id});

    let own = h.json(query, vars.clone(), Some(&bob.access)).await;
    assert_eq!(own["data"]["user"]["email"], "b@x.com");
    let by_admin = h.json(query, vars.clone(), Some(&admin.access)).await;
    assert_eq!(by_admin["data"]["user"]["email"], "b@x.com");
    let by_other = h.json(query, vars.clone(), Some(&carol.access)).await;
    assert_eq!(by_other["data"]["user"]["email"], json!(null));
    let anonymous = h.json(query, vars, None).await;
    assert_eq!(anonymous["data"]["user"]["username"], "bob");
    assert_eq!(anonymous["data"]["user"]["email"], json!(null));
}

#[tokio::test]
async fn test_session_payload_shows_the_new_account_its_email() {
    let h = Harness::new();
    let registered = h
        .json(
            "mutation { register(input: {username: \"bob\", email: \"b@x.com\", password: \"Secret123!\"}) {
                 user { email }
             } }",
            json!({}),
            None,
        )
        .await;
    assert_eq!(registered["data"]["register"]["user"]["email"], "b@x.com");

    let login = "mutation Login($email: String!, $password: String!) {
        login(email: $email, password: $password) { user { email } }
    }";
    let logged_in = h
        .json(login, json!({"email": "b@x.com", "password": PASSWORD}), None)
        .await;
    assert_eq!(logged_in["data"]["login"]["user"]["email"], "b@x.com");
}
