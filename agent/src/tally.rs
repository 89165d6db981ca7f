//! Tally XML 客户端
//!
//! 固定的导出请求信封 + 流式 XML 解析。Tally 的回复经常夹杂非法字符，
//! 解析器遇到无法解码的文本直接跳过，不中断整个文档。

use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use common::errors::{AppError, AppResult};
use common::models::tally::{CompanyRecord, Voucher};

/// Result of a raw XML passthrough.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TallyQueryResult {
    pub status_code: u16,
    pub tally_response: String,
}

#[derive(Clone)]
pub struct TallyClient {
    client: reqwest::Client,
    url: String,
    company: String,
}

impl TallyClient {
    pub fn new(client: reqwest::Client, url: impl Into<String>, company: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            company: company.into(),
        }
    }

    /// POSTs an envelope and returns the status with the body text.
    async fn post_xml(&self, xml: String) -> AppResult<(u16, String)> {
        let resp = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "text/xml")
            .body(xml)
            .send()
            .await
            .map_err(|e| AppError::ExternalService(format!("tally request failed: {}", e)))?;
        let status = resp.status().as_u16();
        let body = resp
            .text()
            .await
            .map_err(|e| AppError::ExternalService(format!("tally reply unreadable: {}", e)))?;
        Ok((status, body))
    }

    /// Like [`post_xml`](Self::post_xml), failing on a non-2xx status.
    async fn export(&self, xml: String) -> AppResult<String> {
        let (status, body) = self.post_xml(xml).await?;
        if !(200..300).contains(&status) {
            return Err(AppError::ExternalService(format!(
                "tally returned status {}",
                status
            )));
        }
        Ok(body)
    }

    pub async fn companies(&self) -> AppResult<Vec<String>> {
        let body = self.export(envelope::export_data("Company", None)).await?;
        Ok(parse_named(&body, b"COMPANY"))
    }

    pub async fn ledgers(&self, company: &str) -> AppResult<Vec<String>> {
        let body = self.export(envelope::export_data("Ledger", Some(company))).await?;
        Ok(parse_named(&body, b"LEDGER"))
    }

    pub async fn vouchers(&self, company: &str) -> AppResult<Vec<Voucher>> {
        let body = self
            .export(envelope::export_data("Vouchers", Some(company)))
            .await?;
        Ok(parse_vouchers(&body))
    }

    /// Ledgers and vouchers of every company. Any failure aborts the whole fetch.
    pub async fn sync_all(&self) -> AppResult<Vec<CompanyRecord>> {
        let companies = self.companies().await?;
        let mut records = Vec::with_capacity(companies.len());
        for company in companies {
            let ledgers = self.ledgers(&company).await?;
            let vouchers = self.vouchers(&company).await?;
            tracing::debug!(%company, ledgers = ledgers.len(), vouchers = vouchers.len(), "tally company fetched");
            records.push(CompanyRecord {
                company,
                ledgers,
                vouchers,
            });
        }
        Ok(records)
    }

    /// Raw `List of Ledgers` collection for the configured company.
    pub async fn list_ledgers(&self) -> AppResult<String> {
        self.export(envelope::collection("List of Ledgers", &self.company))
            .await
    }

    /// Forwards caller-supplied XML as-is.
    pub async fn query(&self, xml: String) -> AppResult<TallyQueryResult> {
        let (status_code, tally_response) = self.post_xml(xml).await?;
        Ok(TallyQueryResult {
            status_code,
            tally_response,
        })
    }
}

pub mod envelope {
    use super::escape;

    /// `Export / Data / <id>` request, optionally scoped to one company.
    pub fn export_data(id: &str, company: Option<&str>) -> String {
        let company = company
            .map(|c| format!("<SVCOMPANY>{}</SVCOMPANY>", escape(c)))
            .unwrap_or_default();
        format!(
            "<ENVELOPE>\
             <HEADER><VERSION>1</VERSION><TALLYREQUEST>Export</TALLYREQUEST><TYPE>Data</TYPE><ID>{id}</ID></HEADER>\
             <BODY><DESC><STATICVARIABLES>\
             <SVEXPORTFORMAT>$$SysName:XML</SVEXPORTFORMAT>{company}\
             </STATICVARIABLES></DESC></BODY>\
             </ENVELOPE>"
        )
    }

    /// `Export / Collection / <id>` request for `company`.
    pub fn collection(id: &str, company: &str) -> String {
        format!(
            "<ENVELOPE>\
             <HEADER><VERSION>1</VERSION><TALLYREQUEST>Export</TALLYREQUEST><TYPE>Collection</TYPE><ID>{}</ID></HEADER>\
             <BODY><DESC><STATICVARIABLES>\
             <SVEXPORTFORMAT>$$SysName:XML</SVEXPORTFORMAT><SVCURRENTCOMPANY>{}</SVCURRENTCOMPANY>\
             </STATICVARIABLES></DESC></BODY>\
             </ENVELOPE>",
            escape(id),
            escape(company)
        )
    }
}

fn tag_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).to_uppercase()
}

fn name_attr(e: &BytesStart<'_>) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref().eq_ignore_ascii_case(b"NAME"))
        .and_then(|a| a.unescape_value().ok().map(|v| v.trim().to_string()))
        .filter(|v| !v.is_empty())
}

fn text_of(e: &BytesText<'_>) -> String {
    e.unescape().map(|t| t.trim().to_string()).unwrap_or_default()
}

/// Names of every `element`, from its `NAME` attribute, a `<NAME>` child
/// or, failing both, its own text.
pub fn parse_named(xml: &str, element: &[u8]) -> Vec<String> {
    let element = String::from_utf8_lossy(element).to_uppercase();
    let mut reader = Reader::from_str(xml);
    let mut names = Vec::new();
    let mut depth = 0usize;
    let mut current: Option<String> = None;
    let mut own_text = String::new();
    let mut in_name = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                let tag = tag_name(e);
                if depth == 0 && tag == element {
                    depth = 1;
                    current = name_attr(e);
                    own_text.clear();
                } else if depth > 0 {
                    depth += 1;
                    in_name = depth == 2 && tag == "NAME" && current.is_none();
                }
            }
            Ok(Event::Empty(ref e)) => {
                if depth == 0 && tag_name(e) == element {
                    if let Some(name) = name_attr(e) {
                        names.push(name);
                    }
                }
            }
            Ok(Event::Text(ref e)) if depth > 0 => {
                let text = text_of(e);
                if text.is_empty() {
                    continue;
                }
                if in_name {
                    current = Some(text);
                } else if depth == 1 {
                    if !own_text.is_empty() {
                        own_text.push(' ');
                    }
                    own_text.push_str(&text);
                }
            }
            Ok(Event::End(_)) => {
                in_name = false;
                if depth == 1 {
                    let text = std::mem::take(&mut own_text);
                    let name = current.take().or(Some(text).filter(|t| !t.is_empty()));
                    names.extend(name);
                }
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                tracing::warn!(error = %e, "malformed tally XML, keeping what was parsed");
                break;
            }
            _ => {}
        }
    }
    names
}

/// Vouchers with the `DATE`, `VOUCHERTYPENAME`, `AMOUNT` and `NARRATION`
/// direct children of each `VOUCHER`. Amounts inside ledger entry lists
/// are not read.
pub fn parse_vouchers(xml: &str) -> Vec<Voucher> {
    let mut reader = Reader::from_str(xml);
    let mut vouchers = Vec::new();
    let mut current: Option<Voucher> = None;
    let mut depth = 0usize;
    let mut field = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                let tag = tag_name(e);
                if current.is_none() && tag == "VOUCHER" {
                    current = Some(Voucher::default());
                    depth = 1;
                } else if current.is_some() {
                    depth += 1;
                    if depth == 2 {
                        field = tag;
                    } else {
                        field.clear();
                    }
                }
            }
            Ok(Event::Text(ref e)) => {
                if let Some(voucher) = current.as_mut() {
                    let text = text_of(e);
                    if text.is_empty() {
                        continue;
                    }
                    let slot = match field.as_str() {
                        "DATE" => &mut voucher.date,
                        "VOUCHERTYPENAME" => &mut voucher.voucher_type,
                        "AMOUNT" => &mut voucher.amount,
                        "NARRATION" => &mut voucher.narration,
                        _ => continue,
                    };
                    if slot.is_none() {
                        *slot = Some(text);
                    }
                }
            }
            Ok(Event::End(_)) => {
                field.clear();
                if current.is_some() {
                    depth -= 1;
                    if depth == 0 {
                        vouchers.extend(current.take());
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                tracing::warn!(error = %e, "malformed tally XML, keeping what was parsed");
                break;
            }
            _ => {}
        }
    }
    vouchers
}
