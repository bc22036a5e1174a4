use axum::{
    Extension, Form, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{Datelike, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;
use services::services::{
    invoice::{
        Invoice, InvoiceAction, InvoiceStatus, LineItem, Totals, compute_totals,
        default_currency, invoice_number, next_sequence, parse_line_items, parse_tax_rate,
    },
    sdb::query_as,
};
use tracing::{info, instrument};
use utils::htmx::{HxResponse, ToastKind, redirect};

use crate::{
    AppState,
    auth::RequestContext,
    error::ApiError,
    extract::Htmx,
    routes::page,
    store::{self, Collection, INVOICES},
    views::{
        Section,
        billing::{self as view, InvoiceFormValues},
    },
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/billing/invoices", get(list_invoices).post(create_invoice))
        .route("/billing/invoices/new", get(new_invoice))
        .route(
            "/billing/invoices/{key}",
            get(show_invoice).put(update_invoice).delete(delete_invoice),
        )
        .route("/billing/invoices/{key}/edit", get(edit_invoice))
        .route("/billing/invoices/{key}/send", post(send_invoice))
        .route("/billing/invoices/{key}/pay", post(pay_invoice))
        .route("/billing/invoices/{key}/void", post(void_invoice))
}

fn invoices(state: &AppState) -> Collection<'_> {
    Collection::new(state.sdb(), INVOICES)
}

async fn load_invoice(state: &AppState, key: &str) -> Result<Invoice, ApiError> {
    invoices(state)
        .get(key)
        .await?
        .ok_or_else(|| ApiError::not_found("Invoice"))
}

/// Everything an invoice form submits, validated together.
#[derive(Debug, PartialEq)]
pub struct InvoiceInput {
    pub customer_name: String,
    pub customer_email: String,
    pub due_date: Option<String>,
    pub currency: String,
    pub tax_rate_bp: i64,
    pub items: Vec<LineItem>,
    pub totals: Totals,
}

fn field<'a>(pairs: &'a [(String, String)], name: &str) -> &'a str {
    pairs
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.trim())
        .unwrap_or_default()
}

/// Form values as submitted, for re-rendering a rejected form.
pub fn form_values(pairs: &[(String, String)]) -> InvoiceFormValues {
    let mut rows: std::collections::BTreeMap<usize, (String, String, String)> =
        std::collections::BTreeMap::new();
    for (key, value) in pairs {
        let Some((index, column)) = key
            .strip_prefix("items[")
            .and_then(|rest| rest.split_once("]["))
        else {
            continue;
        };
        let Ok(index) = index.parse::<usize>() else {
            continue;
        };
        let row = rows.entry(index).or_default();
        match column.trim_end_matches(']') {
            "description" => row.0 = value.clone(),
            "quantity" => row.1 = value.clone(),
            "unit_price" => row.2 = value.clone(),
            _ => {}
        }
    }
    InvoiceFormValues {
        customer_name: field(pairs, "customer_name").to_string(),
        customer_email: field(pairs, "customer_email").to_string(),
        due_date: field(pairs, "due_date").to_string(),
        currency: field(pairs, "currency").to_string(),
        tax_rate: field(pairs, "tax_rate").to_string(),
        items: rows
            .into_values()
            .filter(|(d, q, p)| !(d.trim().is_empty() && q.trim().is_empty() && p.trim().is_empty()))
            .collect(),
    }
}

/// Validate a submitted invoice form, collecting every problem.
pub fn parse_invoice_form(pairs: &[(String, String)]) -> Result<InvoiceInput, Vec<String>> {
    let mut problems = Vec::new();

    let customer_name = field(pairs, "customer_name");
    if customer_name.is_empty() {
        problems.push("Customer name is required".to_string());
    }
    let customer_email = field(pairs, "customer_email");
    if !customer_email.is_empty() && !customer_email.contains('@') {
        problems.push("Customer email is invalid".to_string());
    }

    let due_date = match field(pairs, "due_date") {
        "" => None,
        raw => match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            Ok(date) => Some(date.format("%Y-%m-%d").to_string()),
            Err(_) => {
                problems.push(format!("Invalid due date '{raw}'"));
                None
            }
        },
    };

    let currency = match field(pairs, "currency") {
        "" => default_currency(),
        raw if raw.len() == 3 && raw.bytes().all(|b| b.is_ascii_alphabetic()) => {
            raw.to_ascii_uppercase()
        }
        raw => {
            problems.push(format!("Invalid currency '{raw}'"));
            default_currency()
        }
    };

    let tax_rate_bp = parse_tax_rate(field(pairs, "tax_rate")).unwrap_or_else(|e| {
        problems.push(e.to_string());
        0
    });
    let items = parse_line_items(pairs).unwrap_or_else(|e| {
        problems.push(e.to_string());
        Vec::new()
    });

    if !problems.is_empty() {
        return Err(problems);
    }
    let totals = compute_totals(&items, tax_rate_bp).map_err(|e| vec![e.to_string()])?;
    Ok(InvoiceInput {
        customer_name: customer_name.to_string(),
        customer_email: customer_email.to_string(),
        due_date,
        currency,
        tax_rate_bp,
        items,
        totals,
    })
}

fn rejected_form(
    ctx: &RequestContext,
    key: Option<&str>,
    pairs: &[(String, String)],
    problems: &[String],
    htmx: bool,
) -> Response {
    let body = view::form(key, &form_values(pairs), problems);
    (
        StatusCode::BAD_REQUEST,
        page("Invoice", Section::Billing, ctx, body, htmx),
    )
        .into_response()
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
}

#[instrument(name = "billing.list", skip(state, ctx), fields(user = %ctx.user.key))]
async fn list_invoices(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Htmx(htmx): Htmx,
    Query(query): Query<ListQuery>,
) -> Result<Response, ApiError> {
    let filter: Option<InvoiceStatus> = match query.status.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(raw.parse()?),
    };

    let list: Vec<Invoice> = match filter {
        Some(status) => {
            query_as(
                state.sdb(),
                "FOR i IN invoices FILTER i.status == @status SORT i.created_at DESC RETURN i",
                json!({ "status": status }),
            )
            .await?
        }
        None => {
            query_as(
                state.sdb(),
                "FOR i IN invoices SORT i.created_at DESC RETURN i",
                json!({}),
            )
            .await?
        }
    };
    Ok(page("Invoices", Section::Billing, &ctx, view::list(&list, filter), htmx).into_response())
}

async fn new_invoice(Extension(ctx): Extension<RequestContext>, Htmx(htmx): Htmx) -> Response {
    let body = view::form(None, &InvoiceFormValues::default(), &[]);
    page("New invoice", Section::Billing, &ctx, body, htmx).into_response()
}

#[instrument(name = "billing.create", skip(state, ctx, pairs), fields(user = %ctx.user.key))]
async fn create_invoice(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Htmx(htmx): Htmx,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Result<Response, ApiError> {
    let input = match parse_invoice_form(&pairs) {
        Ok(input) => input,
        Err(problems) => return Ok(rejected_form(&ctx, None, &pairs, &problems, htmx)),
    };

    let year = Utc::now().year();
    let issued: Vec<String> = query_as(
        state.sdb(),
        "FOR i IN invoices FILTER STARTS_WITH(i.number, @prefix) RETURN i.number",
        json!({ "prefix": format!("INV-{year}-") }),
    )
    .await?;
    let number = invoice_number(year, next_sequence(year, &issued));

    let invoice: Invoice = invoices(&state)
        .insert(json!({
            "number": number,
            "status": InvoiceStatus::Draft,
            "customer_name": input.customer_name,
            "customer_email": input.customer_email,
            "currency": input.currency,
            "due_date": input.due_date,
            "items": input.items,
            "tax_rate_bp": input.tax_rate_bp,
            "totals": input.totals,
            "created_by": ctx.user.key,
            "created_at": store::now(),
        }))
        .await?;
    info!(invoice = %invoice.key, number = %invoice.number, "invoice created");
    Ok(redirect(htmx, &format!("/billing/invoices/{}", invoice.key)))
}

#[instrument(name = "billing.show", skip(state, ctx), fields(user = %ctx.user.key))]
async fn show_invoice(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Htmx(htmx): Htmx,
    Path(key): Path<String>,
) -> Result<Response, ApiError> {
    let invoice = load_invoice(&state, &key).await?;
    Ok(page(&invoice.number, Section::Billing, &ctx, view::detail(&invoice), htmx).into_response())
}

#[instrument(name = "billing.edit", skip(state, ctx), fields(user = %ctx.user.key))]
async fn edit_invoice(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Htmx(htmx): Htmx,
    Path(key): Path<String>,
) -> Result<Response, ApiError> {
    let invoice = load_invoice(&state, &key).await?;
    invoice.status.ensure_editable()?;
    let body = view::form(Some(&invoice.key), &InvoiceFormValues::from_invoice(&invoice), &[]);
    Ok(page(&invoice.number, Section::Billing, &ctx, body, htmx).into_response())
}

#[instrument(name = "billing.update", skip(state, ctx, pairs), fields(user = %ctx.user.key))]
async fn update_invoice(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Htmx(htmx): Htmx,
    Path(key): Path<String>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Result<Response, ApiError> {
    let invoice = load_invoice(&state, &key).await?;
    invoice.status.ensure_editable()?;

    let input = match parse_invoice_form(&pairs) {
        Ok(input) => input,
        Err(problems) => return Ok(rejected_form(&ctx, Some(&key), &pairs, &problems, htmx)),
    };
    invoices(&state)
        .update::<Invoice>(
            &invoice.key,
            json!({
                "customer_name": input.customer_name,
                "customer_email": input.customer_email,
                "currency": input.currency,
                "due_date": input.due_date,
                "items": input.items,
                "tax_rate_bp": input.tax_rate_bp,
                "totals": input.totals,
                "updated_at": store::now(),
            }),
        )
        .await?;
    info!(invoice = %invoice.key, "invoice updated");
    Ok(redirect(htmx, &format!("/billing/invoices/{}", invoice.key)))
}

async fn transition(
    state: &AppState,
    ctx: &RequestContext,
    key: &str,
    action: InvoiceAction,
    htmx: bool,
) -> Result<Response, ApiError> {
    let invoice = load_invoice(state, key).await?;
    let next = invoice.status.apply(action)?;

    let mut patch = json!({ "status": next });
    match action {
        InvoiceAction::Send => patch["sent_at"] = json!(store::now()),
        InvoiceAction::Pay => patch["paid_at"] = json!(store::now()),
        InvoiceAction::Void => patch["voided_at"] = json!(store::now()),
    }
    let updated: Invoice = invoices(state)
        .update(&invoice.key, patch)
        .await?
        .ok_or_else(|| ApiError::not_found("Invoice"))?;
    info!(invoice = %invoice.key, from = %invoice.status, to = %next, user = %ctx.user.key, "invoice status changed");

    if !htmx {
        return Ok(redirect(false, &format!("/billing/invoices/{}", invoice.key)));
    }
    Ok(HxResponse::fragment(view::detail(&updated))
        .toast(&format!("Invoice {} is now {next}", updated.number), ToastKind::Success)
        .into_response())
}

#[instrument(name = "billing.send", skip(state, ctx))]
async fn send_invoice(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Htmx(htmx): Htmx,
    Path(key): Path<String>,
) -> Result<Response, ApiError> {
    transition(&state, &ctx, &key, InvoiceAction::Send, htmx).await
}

#[instrument(name = "billing.pay", skip(state, ctx))]
async fn pay_invoice(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Htmx(htmx): Htmx,
    Path(key): Path<String>,
) -> Result<Response, ApiError> {
    transition(&state, &ctx, &key, InvoiceAction::Pay, htmx).await
}

#[instrument(name = "billing.void", skip(state, ctx))]
async fn void_invoice(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Htmx(htmx): Htmx,
    Path(key): Path<String>,
) -> Result<Response, ApiError> {
    transition(&state, &ctx, &key, InvoiceAction::Void, htmx).await
}

#[instrument(name = "billing.delete", skip(state, ctx), fields(user = %ctx.user.key))]
async fn delete_invoice(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Htmx(htmx): Htmx,
    Path(key): Path<String>,
) -> Result<Response, ApiError> {
    let invoice = load_invoice(&state, &key).await?;
    if invoice.status != InvoiceStatus::Draft {
        return Err(ApiError::Conflict(
            "Only draft invoices can be deleted".to_string(),
        ));
    }
    invoices(&state).remove(&invoice.key).await?;
    info!(invoice = %invoice.key, "invoice deleted");
    Ok(redirect(htmx, "/billing/invoices"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(raw: &[(&str, &str)]) -> Vec<(String, String)> {
        raw.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn parses_a_complete_form() {
        let input = parse_invoice_form(&pairs(&[
            ("customer_name", "ACME"),
            ("customer_email", "billing@acme.test"),
            ("due_date", "2026-11-30"),
            ("currency", "usd"),
            ("tax_rate", "20"),
            ("items[0][description]", "Consulting"),
            ("items[0][quantity]", "2"),
            ("items[0][unit_price]", "150.00"),
            ("items[1][description]", ""),
        ]))
        .unwrap();
        assert_eq!(input.currency, "USD");
        assert_eq!(input.tax_rate_bp, 2000);
        assert_eq!(input.items.len(), 1);
        assert_eq!(input.totals.total, 36000);
    }

    #[test]
    fn oversized_totals_are_a_form_problem() {
        let problems = parse_invoice_form(&pairs(&[
            ("customer_name", "ACME"),
            ("items[0][description]", "Bulk"),
            ("items[0][quantity]", "100000000000"),
            ("items[0][unit_price]", "1000000000"),
        ]))
        .unwrap_err();
        assert_eq!(problems, vec!["line 1: amount is too large".to_string()]);
    }

    #[test]
    fn collects_every_problem() {
        let problems = parse_invoice_form(&pairs(&[
            ("customer_name", " "),
            ("due_date", "30/11/2026"),
            ("tax_rate", "150"),
        ]))
        .unwrap_err();
        assert_eq!(problems.len(), 4);
        assert_eq!(problems[0], "Customer name is required");
    }

    #[test]
    fn rejected_values_are_kept() {
        let values = form_values(&pairs(&[
            ("customer_name", "ACME"),
            ("items[0][description]", "Widget"),
            ("items[0][quantity]", "abc"),
            ("items[1][description]", ""),
        ]));
        assert_eq!(values.customer_name, "ACME");
        assert_eq!(
            values.items,
            vec![("Widget".to_string(), "abc".to_string(), String::new())]
        );
    }
}
