//! Ledger collaborator: the bookkeeping web platform, driven through a
//! WebDriver session.
//!
//! The platform has no API; entries are made by filling its sales-invoice
//! form exactly as a human would. The session is stateful and
//! non-transactional, so a failure anywhere aborts the whole submission;
//! there is no resuming a half-filled form.

mod webdriver;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use crate::config::LedgerConfig;
use crate::error::LedgerError;
use crate::invoice::Invoice;
use crate::pipeline::LedgerSink;
use webdriver::WebDriverSession;

// Fixed entry kind for timesheet-backed self-bill invoices.
const SERVICE_TYPE: &str = "Timesheet";
const RATE_TYPE: &str = "Hours";
const WORK_DESCRIPTION: &str = "Week work";

pub struct LedgerClient {
    session: WebDriverSession,
    base_url: String,
    username: String,
    password: String,
    logged_in: bool,
}

impl LedgerClient {
    /// Open a browser session and land on the platform's login page.
    pub async fn connect(cfg: &LedgerConfig) -> Result<Self, LedgerError> {
        let session =
            WebDriverSession::connect(&cfg.webdriver_url, Duration::from_secs(cfg.timeout_secs))
                .await?;
        session.goto(&cfg.base_url).await?;
        info!(url = %cfg.base_url, "Opened bookkeeping platform");

        Ok(Self {
            session,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            username: cfg.username.clone(),
            password: cfg.password.clone(),
            logged_in: false,
        })
    }

    pub async fn close(self) -> Result<(), LedgerError> {
        self.session.close().await
    }

    async fn login(&mut self) -> Result<(), LedgerError> {
        self.session
            .find("input[name='UserName']")
            .await?
            .send_keys(&self.username)
            .await?;
        self.session
            .find("input[name='UserPassword']")
            .await?
            .send_keys(&self.password)
            .await?;
        self.session
            .find("#kt_login_singin_form_submit_button")
            .await?
            .click()
            .await?;
        self.logged_in = true;
        info!("Logged into bookkeeping platform");
        Ok(())
    }

    async fn open_invoice_page(&self) -> Result<(), LedgerError> {
        self.session
            .goto(&format!("{}/salesinvoice/show", self.base_url))
            .await
    }

    /// Selenium-style "select by visible text" for the platform's
    /// dropdowns, which key on display text rather than stable values.
    async fn select_by_visible_text(&self, css: &str, text: &str) -> Result<(), LedgerError> {
        let select = self.session.find(css).await?;
        self.session
            .execute(
                "const select = arguments[0];\n\
                 const wanted = arguments[1];\n\
                 const option = Array.from(select.options).find(o => o.text.trim() === wanted);\n\
                 if (!option) { throw new Error('no option with text ' + wanted); }\n\
                 select.value = option.value;\n\
                 select.dispatchEvent(new Event('change', { bubbles: true }));",
                vec![select.reference(), json!(text)],
            )
            .await
            .map(drop)
    }

    /// The platform marks its date inputs readonly; strip that before typing.
    async fn fill_date(&self, css: &str, date: &str) -> Result<(), LedgerError> {
        let input = self.session.find(css).await?;
        self.session
            .execute(
                "arguments[0].removeAttribute('readonly')",
                vec![input.reference()],
            )
            .await?;
        input.send_keys(date).await
    }

    async fn fill_client_data(&self, invoice: &Invoice) -> Result<(), LedgerError> {
        self.select_by_visible_text("#client", &invoice.client_name)
            .await?;

        let details = format!(
            "Sheet: {}\nInvoice number: {}",
            invoice.timesheet_id, invoice.invoice_number
        );
        self.session
            .find("#INVOICE_NOTE")
            .await?
            .send_keys(&details)
            .await?;

        self.fill_date("#INVOICE_DATE", &invoice.invoice_date)
            .await?;
        self.fill_date("#INVOICE_DUE_ON", &invoice.payment_due_date)
            .await
    }

    async fn fill_service_data(&self, invoice: &Invoice) -> Result<(), LedgerError> {
        self.select_by_visible_text("#Service", SERVICE_TYPE).await?;
        self.select_by_visible_text("#Type", RATE_TYPE).await?;
        self.select_by_visible_text("#Vat", &format!("{}%", invoice.vat_rate))
            .await?;

        self.session
            .find("#Workdescription")
            .await?
            .send_keys(WORK_DESCRIPTION)
            .await?;
        self.session
            .find("#Quantity")
            .await?
            .send_keys(&invoice.hours_label())
            .await?;
        self.session
            .find("#Rate")
            .await?
            .send_keys(&invoice.hour_rate)
            .await
    }

    async fn fill_internal_note(&self, invoice: &Invoice) -> Result<(), LedgerError> {
        self.session
            .find("#CUSTOMER_NOTE")
            .await?
            .send_keys(&invoice.internal_note())
            .await
    }

    async fn submit_invoice(&self) -> Result<(), LedgerError> {
        self.session
            .execute("window.scrollTo(0, document.body.scrollHeight);", vec![])
            .await?;
        self.session.find("#btnSaveInvoice").await?.click().await?;
        self.confirm_submit_popup().await
    }

    async fn confirm_submit_popup(&self) -> Result<(), LedgerError> {
        self.session
            .execute("window.scrollTo(0, 0);", vec![])
            .await?;
        self.session.find("[id='1']").await?.click().await?;
        self.session.find(".swal2-confirm").await?.click().await
    }
}

#[async_trait]
impl LedgerSink for LedgerClient {
    async fn submit(&mut self, invoice: &Invoice) -> Result<(), LedgerError> {
        if !self.logged_in {
            self.login().await?;
        }
        self.open_invoice_page().await?;
        self.fill_client_data(invoice).await?;
        self.fill_service_data(invoice).await?;
        self.fill_internal_note(invoice).await?;
        self.submit_invoice().await?;
        info!(invoice_number = %invoice.invoice_number, "Invoice registered in ledger");
        Ok(())
    }
}
