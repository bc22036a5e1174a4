use utils::html::escape;

use super::{errors, text_input};

pub fn login_form(email: &str, error: Option<&str>) -> String {
    let errors = errors(&error.map(str::to_string).into_iter().collect::<Vec<_>>());
    format!(
        r##"<section class="auth" id="login">
<h1>Sign in</h1>
{errors}
<form method="post" action="/auth/login" hx-post="/auth/login" hx-target="#login" hx-swap="outerHTML">
{email}
{password}
<button type="submit">Sign in</button>
</form>
<p>No account yet? <a href="/auth/register">Create one</a>.</p>
</section>"##,
        email = text_input("email", "Email", email, "email", true),
        password = text_input("password", "Password", "", "password", true),
    )
}

pub fn two_factor_form(error: Option<&str>) -> String {
    let errors = errors(&error.map(str::to_string).into_iter().collect::<Vec<_>>());
    format!(
        r##"<section class="auth" id="two-factor">
<h1>Two-factor authentication</h1>
<p>Enter the 6-digit code from your authenticator app.</p>
{errors}
<form method="post" action="/auth/2fa" hx-post="/auth/2fa" hx-target="#two-factor" hx-swap="outerHTML">
<label>Code<input name="code" inputmode="numeric" autocomplete="one-time-code" pattern="[0-9]{{6}}" required autofocus></label>
<button type="submit">Verify</button>
</form>
</section>"##
    )
}

pub struct RegisterValues<'a> {
    pub username: &'a str,
    pub email: &'a str,
}

pub fn register_form(values: &RegisterValues<'_>, messages: &[String]) -> String {
    format!(
        r##"<section class="auth" id="register">
<h1>Create an account</h1>
{errors}
<form method="post" action="/auth/register" hx-post="/auth/register" hx-target="#register" hx-swap="outerHTML">
{username}
{email}
{password}
{confirm}
<button type="submit">Create account</button>
</form>
<p>Already registered? <a href="/auth/login">Sign in</a>.</p>
</section>"##,
        errors = errors(messages),
        username = text_input("username", "Username", values.username, "text", true),
        email = text_input("email", "Email", values.email, "email", true),
        password = text_input("password", "Password (8 characters minimum)", "", "password", true),
        confirm = text_input("password_confirm", "Confirm password", "", "password", true),
    )
}

pub fn two_factor_setup(secret: &str, uri: &str, error: Option<&str>) -> String {
    let errors = errors(&error.map(str::to_string).into_iter().collect::<Vec<_>>());
    format!(
        r##"<section class="auth" id="two-factor-setup">
<h1>Enable two-factor authentication</h1>
<p>Add this account to your authenticator app, then confirm with a code.</p>
<p><a href="{uri}">{uri_text}</a></p>
<p>Secret: <code>{secret}</code></p>
{errors}
<form method="post" action="/auth/2fa/enable" hx-post="/auth/2fa/enable" hx-target="#two-factor-setup" hx-swap="outerHTML">
<label>Code<input name="code" inputmode="numeric" pattern="[0-9]{{6}}" required></label>
<button type="submit">Enable</button>
</form>
</section>"##,
        uri = escape(uri),
        uri_text = escape(uri),
        secret = escape(secret),
    )
}

pub fn two_factor_enabled(error: Option<&str>) -> String {
    let errors = errors(&error.map(str::to_string).into_iter().collect::<Vec<_>>());
    format!(
        r##"<section class="auth" id="two-factor-setup">
<h1>Two-factor authentication is on</h1>
{errors}
<form method="post" action="/auth/2fa/disable" hx-post="/auth/2fa/disable" hx-target="#two-factor-setup" hx-swap="outerHTML">
<label>Current code<input name="code" inputmode="numeric" pattern="[0-9]{{6}}" required></label>
<button type="submit" class="danger">Disable</button>
</form>
</section>"##
    )
}
