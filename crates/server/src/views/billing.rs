use std::fmt::Write as _;

use services::services::invoice::{
    Invoice, InvoiceStatus, format_amount, format_money, format_rate,
};
use utils::html::escape;

use super::{errors, text_input, timestamp};

/// Raw form values, kept so a rejected form comes back as typed.
#[derive(Debug, Clone, Default)]
pub struct InvoiceFormValues {
    pub customer_name: String,
    pub customer_email: String,
    pub due_date: String,
    pub currency: String,
    pub tax_rate: String,
    /// `(description, quantity, unit_price)` per row.
    pub items: Vec<(String, String, String)>,
}

impl InvoiceFormValues {
    pub fn from_invoice(invoice: &Invoice) -> Self {
        Self {
            customer_name: invoice.customer_name.clone(),
            customer_email: invoice.customer_email.clone(),
            due_date: invoice.due_date.clone().unwrap_or_default(),
            currency: invoice.currency.clone(),
            tax_rate: format_rate(invoice.tax_rate_bp).trim_end_matches('%').to_string(),
            items: invoice
                .items
                .iter()
                .map(|item| {
                    (
                        item.description.clone(),
                        format_amount(item.quantity),
                        format_amount(item.unit_price),
                    )
                })
                .collect(),
        }
    }
}

fn status_badge(status: InvoiceStatus) -> String {
    format!(
        r#"<span class="badge status-{s}">{s}</span>"#,
        s = status.as_str()
    )
}

pub fn list(invoices: &[Invoice], filter: Option<InvoiceStatus>) -> String {
    let mut tabs = String::new();
    let all_class = if filter.is_none() { " class=\"active\"" } else { "" };
    let _ = write!(tabs, r#"<a href="/billing/invoices"{all_class}>All</a>"#);
    for status in InvoiceStatus::ALL {
        let class = if filter == Some(status) { " class=\"active\"" } else { "" };
        let _ = write!(
            tabs,
            r#" <a href="/billing/invoices?status={s}"{class}>{s}</a>"#,
            s = status.as_str()
        );
    }

    let rows: String = invoices
        .iter()
        .map(|inv| {
            format!(
                r#"<tr><td><a href="/billing/invoices/{key}">{number}</a></td><td>{customer}</td><td>{status}</td><td>{due}</td><td class="num">{total}</td></tr>"#,
                key = escape(&inv.key),
                number = escape(&inv.number),
                customer = escape(&inv.customer_name),
                status = status_badge(inv.status),
                due = escape(inv.due_date.as_deref().unwrap_or("")),
                total = escape(&format_money(inv.totals.total, &inv.currency)),
            )
        })
        .collect();

    format!(
        r#"<section id="invoices">
<h1>Invoices</h1>
<p><a href="/billing/invoices/new" class="button">New invoice</a></p>
<nav class="tabs">{tabs}</nav>
<table><thead><tr><th>Number</th><th>Customer</th><th>Status</th><th>Due</th><th>Total</th></tr></thead><tbody>{rows}</tbody></table>
</section>"#
    )
}

fn item_row(index: usize, description: &str, quantity: &str, unit_price: &str) -> String {
    format!(
        r#"<tr><td><input name="items[{index}][description]" value="{d}"></td><td><input name="items[{index}][quantity]" value="{q}" inputmode="decimal" size="6"></td><td><input name="items[{index}][unit_price]" value="{p}" inputmode="decimal" size="8"></td></tr>"#,
        d = escape(description),
        q = escape(quantity),
        p = escape(unit_price),
    )
}

/// New or edit form; `key` is set when editing an existing draft.
pub fn form(key: Option<&str>, values: &InvoiceFormValues, form_errors: &[String]) -> String {
    let mut rows = String::new();
    for (index, (d, q, p)) in values.items.iter().enumerate() {
        rows.push_str(&item_row(index, d, q, p));
    }
    rows.push_str(&item_row(values.items.len(), "", "", ""));

    let (title, attrs) = match key {
        Some(key) => (
            "Edit invoice",
            format!(
                r##"hx-put="/billing/invoices/{k}" hx-target="#invoice-form" hx-swap="outerHTML""##,
                k = escape(key)
            ),
        ),
        None => (
            "New invoice",
            r##"method="post" action="/billing/invoices" hx-post="/billing/invoices" hx-target="#invoice-form" hx-swap="outerHTML""##
                .to_string(),
        ),
    };
    let currency = if values.currency.is_empty() { "EUR" } else { &values.currency };

    format!(
        r#"<section id="invoice-form">
<h1>{title}</h1>
{errors}
<form {attrs}>
{customer}
{email}
{due}
{currency_input}
{tax}
<table class="items"><thead><tr><th>Description</th><th>Quantity</th><th>Unit price</th></tr></thead><tbody>{rows}</tbody></table>
<button type="submit">Save</button>
</form>
<p><a href="/billing/invoices">Back to invoices</a></p>
</section>"#,
        errors = errors(form_errors),
        customer = text_input("customer_name", "Customer", &values.customer_name, "text", true),
        email = text_input("customer_email", "Customer email", &values.customer_email, "email", false),
        due = text_input("due_date", "Due date", &values.due_date, "date", false),
        currency_input = text_input("currency", "Currency", currency, "text", false),
        tax = text_input("tax_rate", "Tax rate (%)", &values.tax_rate, "text", false),
    )
}

pub fn detail(invoice: &Invoice) -> String {
    let base = format!("/billing/invoices/{}", escape(&invoice.key));
    let lines: String = invoice
        .items
        .iter()
        .map(|item| {
            format!(
                r#"<tr><td>{}</td><td class="num">{}</td><td class="num">{}</td><td class="num">{}</td></tr>"#,
                escape(&item.description),
                format_amount(item.quantity),
                format_amount(item.unit_price),
                item.total().map(format_amount).unwrap_or_default(),
            )
        })
        .collect();

    let actions = match invoice.status {
        InvoiceStatus::Draft => format!(
            r##"<a href="{base}/edit" class="button">Edit</a>
<button hx-post="{base}/send" hx-target="#invoice" hx-swap="outerHTML">Mark as sent</button>
<button hx-post="{base}/void" hx-target="#invoice" hx-swap="outerHTML" hx-confirm="Void this invoice?">Void</button>
<button class="danger" hx-delete="{base}" hx-confirm="Delete this draft?">Delete</button>"##
        ),
        InvoiceStatus::Sent => format!(
            r##"<button hx-post="{base}/pay" hx-target="#invoice" hx-swap="outerHTML">Mark as paid</button>
<button hx-post="{base}/void" hx-target="#invoice" hx-swap="outerHTML" hx-confirm="Void this invoice?">Void</button>"##
        ),
        InvoiceStatus::Paid | InvoiceStatus::Void => String::new(),
    };

    let dates: String = [
        ("Created", invoice.created_at.as_deref()),
        ("Sent", invoice.sent_at.as_deref()),
        ("Paid", invoice.paid_at.as_deref()),
    ]
    .into_iter()
    .filter_map(|(label, at)| at.map(|at| format!("<dt>{label}</dt><dd>{}</dd>", escape(&timestamp(at)))))
    .collect();

    format!(
        r#"<section id="invoice">
<h1>{number} {status}</h1>
<p>{customer} &lt;{email}&gt;</p>
<dl>{dates}<dt>Due</dt><dd>{due}</dd></dl>
<table class="items"><thead><tr><th>Description</th><th>Quantity</th><th>Unit price</th><th>Total</th></tr></thead><tbody>{lines}</tbody>
<tfoot>
<tr><th colspan="3">Subtotal</th><td class="num">{subtotal}</td></tr>
<tr><th colspan="3">Tax ({rate})</th><td class="num">{tax}</td></tr>
<tr><th colspan="3">Total</th><td class="num">{total}</td></tr>
</tfoot></table>
<div class="actions">{actions}</div>
<p><a href="/billing/invoices">Back to invoices</a></p>
</section>"#,
        number = escape(&invoice.number),
        status = status_badge(invoice.status),
        customer = escape(&invoice.customer_name),
        email = escape(&invoice.customer_email),
        due = escape(invoice.due_date.as_deref().unwrap_or("-")),
        subtotal = escape(&format_money(invoice.totals.subtotal, &invoice.currency)),
        rate = format_rate(invoice.tax_rate_bp),
        tax = escape(&format_money(invoice.totals.tax, &invoice.currency)),
        total = escape(&format_money(invoice.totals.total, &invoice.currency)),
    )
}
