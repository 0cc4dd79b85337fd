//! Fixed-format record encoding for report submissions.
//!
//! A report is one header record, one detail record per qualifying unit
//! sold or refunded, and one trailer record. The exact byte layout of every
//! line is the wire contract with the receiving party; do not change field
//! order, padding, or delimiters without coordinating the field spec.

use crate::config::SoundscanConfig;
use crate::order::{Order, OrderStatus, ReportWindow};
use crate::schedule::REFERENCE_TIMEZONE;
use crate::{Result, SoundscanError};
use chrono::{DateTime, Utc, Weekday};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Record tag opening every header record.
const HEADER_TAG: &str = "92";
/// Record tag opening every trailer record.
const TRAILER_TAG: &str = "94";
/// Header content is tag + chain + account + yymmdd: exactly 17 characters.
const HEADER_CONTENT_LEN: usize = 17;
/// Shortest legal trailer: `94 0 0`.
const TRAILER_MIN_LEN: usize = 6;

/// Which side of the catalog a report covers. Each kind carries its own
/// record tag, field delimiter, account, credentials, and submission day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportKind {
    Physical,
    Digital,
}

impl ReportKind {
    /// Tag opening every detail record of this kind.
    pub fn record_tag(&self) -> &'static str {
        match self {
            ReportKind::Physical => "M3",
            ReportKind::Digital => "D3",
        }
    }

    /// Weekday the receiving party expects this kind's report on.
    pub fn submission_day(&self) -> Weekday {
        match self {
            ReportKind::Physical => Weekday::Tue,
            ReportKind::Digital => Weekday::Mon,
        }
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportKind::Physical => write!(f, "physical"),
            ReportKind::Digital => write!(f, "digital"),
        }
    }
}

/// Why a line item was excluded from the report. Reasons are mutually
/// exclusive: validation stops at the first failing rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    /// Item matches neither the album nor the track sub-category.
    NoAssignedType,
    /// Album without a usable 13-digit EAN or pad-to-13 UPC.
    InvalidIdentifier,
    /// Track without a 12-character alphanumeric ISRC.
    InvalidIsrc,
    /// Line price does not clear the configured minimum for its type.
    PriceTooLow,
    /// No valid 5-digit US ZIP on either shipping or billing address.
    InvalidZip,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            RejectReason::NoAssignedType => {
                "the item does not have an assigned type - album or track"
            }
            RejectReason::InvalidIdentifier => "the item does not have a valid EAN or UPC number",
            RejectReason::InvalidIsrc => "the item does not have a valid ISRC",
            RejectReason::PriceTooLow => {
                "the item does not qualify as expensive enough for the report"
            }
            RejectReason::InvalidZip => {
                "the customer must have a valid U.S. zipcode on the billing or delivery address"
            }
        };
        f.write_str(msg)
    }
}

/// A line item excluded from the report, kept for the operator to inspect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedItem {
    pub order_id: u64,
    pub product_id: u64,
    pub reason: RejectReason,
}

/// A finished build: the ordered line sequence plus everything left out.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Report {
    pub lines: Vec<String>,
    pub rejected: Vec<RejectedItem>,
    pub sales: u32,
    pub refunds: u32,
}

impl Report {
    /// Newline-joined submission payload; byte-exact wire contract.
    pub fn render(&self) -> String {
        self.lines.join("\n")
    }

    /// Detail lines only (header and trailer excluded).
    pub fn detail_count(&self) -> usize {
        self.lines.len().saturating_sub(2)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemType {
    Album,
    Track,
}

impl ItemType {
    fn type_code(&self) -> &'static str {
        match self {
            ItemType::Album => "A",
            ItemType::Track => "S",
        }
    }
}

/// A line item that cleared every validation rule.
struct QualifiedItem {
    item_type: ItemType,
    /// 13-digit EAN (or zero-padded UPC); may be empty for digital tracks.
    code: String,
    /// 12-character ISRC; empty for albums.
    isrc: String,
    unit_price: Decimal,
    quantity: u32,
}

/// Accumulator created fresh for every build and discarded after encoding.
#[derive(Default)]
struct BuildContext {
    lines: Vec<String>,
    rejected: Vec<RejectedItem>,
    sales: u32,
    refunds: u32,
}

/// Encodes a stream of orders into report lines for one [`ReportKind`].
pub struct ReportFormatter {
    kind: ReportKind,
    config: SoundscanConfig,
}

impl ReportFormatter {
    pub fn new(kind: ReportKind, config: &SoundscanConfig) -> Self {
        Self {
            kind,
            config: config.clone(),
        }
    }

    pub fn kind(&self) -> ReportKind {
        self.kind
    }

    /// True if this formatter is configured well enough for a build to
    /// produce anything useful.
    pub fn has_necessary_options(&self) -> bool {
        self.config.has_necessary_options(self.kind)
    }

    /// Encode `orders` into a complete report for `window`.
    ///
    /// Header/trailer shape violations abort the whole build; anything wrong
    /// with an individual order is logged and skipped.
    pub fn build(&self, window: &ReportWindow, orders: &[Order]) -> Result<Report> {
        let mut ctx = BuildContext::default();

        self.push_header(&mut ctx, window.end())?;

        for order in orders {
            if !order.status.is_reportable() {
                continue;
            }
            if let Err(err) = self.encode_order(&mut ctx, order) {
                warn!(
                    kind = %self.kind,
                    order = order.id,
                    "skipping order during report build: {err:#}"
                );
            }
        }

        self.push_trailer(&mut ctx)?;

        Ok(Report {
            lines: ctx.lines,
            rejected: ctx.rejected,
            sales: ctx.sales,
            refunds: ctx.refunds,
        })
    }

    fn delimiter(&self) -> &str {
        match self.kind {
            ReportKind::Physical => " ",
            ReportKind::Digital => &self.config.digital_delimiter,
        }
    }

    fn push_header(&self, ctx: &mut BuildContext, end: DateTime<Utc>) -> Result<()> {
        let chain = self.config.chain_no.trim();
        let account = self.config.account_no(self.kind).trim();
        // The period's end day as the receiving party sees it.
        let date = end
            .with_timezone(&REFERENCE_TIMEZONE)
            .format("%y%m%d")
            .to_string();

        let (header, expected) = match self.kind {
            ReportKind::Physical => {
                (format!("{HEADER_TAG}{chain}{account}{date}"), HEADER_CONTENT_LEN)
            }
            ReportKind::Digital => {
                let delim = self.delimiter();
                (
                    [HEADER_TAG, chain, account, &date].join(delim),
                    HEADER_CONTENT_LEN + 3 * delim.chars().count(),
                )
            }
        };

        let actual = header.chars().count();
        if actual != expected {
            return Err(SoundscanError::HeaderLength { expected, actual }.into());
        }

        ctx.lines.push(header);
        Ok(())
    }

    fn push_trailer(&self, ctx: &mut BuildContext) -> Result<()> {
        let delim = self.delimiter();
        let total = ctx.sales + ctx.refunds;
        let trailer = format!("{TRAILER_TAG}{delim}{total}{delim}{}", ctx.sales);

        let actual = trailer.chars().count();
        if actual < TRAILER_MIN_LEN {
            return Err(SoundscanError::TrailerLength {
                min: TRAILER_MIN_LEN,
                actual,
            }
            .into());
        }

        ctx.lines.push(trailer);
        Ok(())
    }

    fn encode_order(&self, ctx: &mut BuildContext, order: &Order) -> Result<()> {
        let zip = self.zip_for(order);
        // 1-based position of the next emitted unit within this order.
        let mut unit_seq: u32 = 1;

        for item in &order.items {
            if !self.is_music(&item.categories) || !self.medium_matches(item.is_virtual) {
                continue;
            }
            if item.quantity == 0 {
                anyhow::bail!("product {} has zero quantity", item.product_id);
            }

            match self.qualify(item, &zip) {
                Ok(qualified) => {
                    for _ in 0..qualified.quantity {
                        let line = self.detail_line(&qualified, &zip, order.status, unit_seq);
                        ctx.lines.push(line);
                        unit_seq += 1;

                        match order.status {
                            OrderStatus::Completed => ctx.sales += 1,
                            OrderStatus::Refunded => ctx.refunds += 1,
                            OrderStatus::Other => {}
                        }
                    }
                }
                Err(reason) => ctx.rejected.push(RejectedItem {
                    order_id: order.id,
                    product_id: item.product_id,
                    reason,
                }),
            }
        }

        Ok(())
    }

    /// Run the fixed validation chain: type, identifier, ISRC (digital
    /// only), price, zip. The first failing rule wins.
    fn qualify(
        &self,
        item: &crate::order::LineItem,
        zip: &str,
    ) -> std::result::Result<QualifiedItem, RejectReason> {
        let item_type = self
            .classify(&item.categories)
            .ok_or(RejectReason::NoAssignedType)?;

        let code = self.resolve_ean(item);
        match self.kind {
            // Physical items always carry the EAN/UPC, singles included.
            ReportKind::Physical => {
                if code.len() != 13 {
                    return Err(RejectReason::InvalidIdentifier);
                }
            }
            ReportKind::Digital => {
                if item_type == ItemType::Album && code.len() != 13 {
                    return Err(RejectReason::InvalidIdentifier);
                }
            }
        }

        let isrc = resolve_isrc(item.isrc.as_deref());
        if self.kind == ReportKind::Digital
            && item_type == ItemType::Track
            && !is_valid_isrc(&isrc)
        {
            return Err(RejectReason::InvalidIsrc);
        }

        let unit_price = match self.kind {
            ReportKind::Physical => item.line_total,
            ReportKind::Digital => item
                .line_total
                .checked_div(Decimal::from(item.quantity))
                .unwrap_or(Decimal::ZERO),
        };
        if !self.is_expensive_enough(unit_price, item_type) {
            return Err(RejectReason::PriceTooLow);
        }

        if !is_valid_zip(zip) {
            return Err(RejectReason::InvalidZip);
        }

        Ok(QualifiedItem {
            item_type,
            code,
            isrc,
            unit_price,
            quantity: item.quantity,
        })
    }

    fn detail_line(
        &self,
        item: &QualifiedItem,
        zip: &str,
        status: OrderStatus,
        unit_seq: u32,
    ) -> String {
        let trans_code = match status {
            OrderStatus::Refunded => "R",
            _ => "S",
        };
        let price = format_price(item.unit_price);
        let seq = unit_seq.to_string();

        let fields: Vec<&str> = match self.kind {
            ReportKind::Physical => vec![
                self.kind.record_tag(),
                &item.code,
                zip,
                trans_code,
                &price,
                item.item_type.type_code(),
                "P",
            ],
            ReportKind::Digital => vec![
                self.kind.record_tag(),
                if item.item_type == ItemType::Album {
                    &item.code
                } else {
                    ""
                },
                zip,
                trans_code,
                &seq,
                if item.item_type == ItemType::Track {
                    &item.isrc
                } else {
                    ""
                },
                &price,
                item.item_type.type_code(),
                // Mobile/PC strata is unavailable from order data; fixed.
                "P",
            ],
        };

        let delim = self.delimiter();
        let line = fields.join(delim);
        line.trim_end_matches(|c: char| c.is_whitespace() || delim.contains(c))
            .to_string()
    }

    fn is_music(&self, categories: &[String]) -> bool {
        categories.iter().any(|c| c == &self.config.music_category)
    }

    fn medium_matches(&self, is_virtual: bool) -> bool {
        match self.kind {
            ReportKind::Physical => !is_virtual,
            ReportKind::Digital => is_virtual,
        }
    }

    fn classify(&self, categories: &[String]) -> Option<ItemType> {
        if categories.iter().any(|c| c == &self.config.album_category) {
            Some(ItemType::Album)
        } else if categories.iter().any(|c| c == &self.config.track_category) {
            Some(ItemType::Track)
        } else {
            None
        }
    }

    /// 13-digit EAN taken directly, or a 12-digit UPC zero-padded to 13;
    /// empty when neither is usable.
    fn resolve_ean(&self, item: &crate::order::LineItem) -> String {
        let ean = digits_of(item.ean.as_deref());
        if ean.len() == 13 {
            return ean;
        }
        let upc = digits_of(item.upc.as_deref());
        if upc.len() == 12 {
            return format!("0{upc}");
        }
        String::new()
    }

    fn is_expensive_enough(&self, price: Decimal, item_type: ItemType) -> bool {
        let minimum = match item_type {
            ItemType::Album => self.config.min_album_price(self.kind),
            ItemType::Track => self.config.min_track_price(self.kind),
        };
        // Strictly greater than: a boundary-priced item does not qualify.
        price.round_dp(2) > minimum
    }

    /// Best available 5-character US ZIP: shipping address first, billing
    /// as fallback. May return an invalid or empty string; validation
    /// happens in the rejection chain.
    fn zip_for(&self, order: &Order) -> String {
        let mut zip = String::new();

        if order.shipping_country == "US" {
            zip = sanitize_zip(&order.shipping_postcode);
        }
        if order.shipping_country != "US" || !is_valid_zip(&zip) {
            if order.billing_country == "US" {
                zip = sanitize_zip(&order.billing_postcode);
            }
        }

        zip
    }
}

/// First five alphanumerics of a postcode, punctuation stripped.
fn sanitize_zip(postcode: &str) -> String {
    postcode
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(5)
        .collect()
}

fn is_valid_zip(zip: &str) -> bool {
    zip.len() == 5 && zip.chars().all(|c| c.is_ascii_digit())
}

fn digits_of(value: Option<&str>) -> String {
    value
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect()
}

/// Strip punctuation from the ISRC and left-zero-pad to 12. Items without
/// any ISRC value keep the empty string and fail validation downstream.
fn resolve_isrc(raw: Option<&str>) -> String {
    let cleaned: String = raw
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    if cleaned.is_empty() {
        return cleaned;
    }
    format!("{cleaned:0>12}")
}

fn is_valid_isrc(isrc: &str) -> bool {
    isrc.len() == 12 && isrc.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Render a price with the decimal point removed, left-zero-padded to 4:
/// 6.00 becomes `0600`, 14.99 becomes `1499`.
fn format_price(price: Decimal) -> String {
    let rendered = format!("{:.2}", price.round_dp(2));
    let digits = rendered.replace('.', "");
    format!("{digits:0>4}")
}
