//! Postgres store (sqlx).
//!
//! Invariants live in the schema: a partial unique index keeps one draft per
//! dealer and an expression index keys lines on their identity tuple. Line
//! mutations lock the PO row first so a concurrent send cannot interleave.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{PgConnection, Postgres, QueryBuilder};
use crate::domain::aggregates::purchase_order::{check_quantity, merge_quantity};
use crate::domain::aggregates::{
    AddOn, AddOnKind, Address, Category, Color, CustomerRole, Dealer, DealerTier, MainCategory, NewLineItem,
    OrderStatus, OrderSummary, Platform, PoLineItem, PoStatus, Product, PurchaseOrder, ReferenceData, Vendor,
};
use crate::domain::value_objects::{DealerId, IdList, LineItemId, NumericId, OrderNumber, PoId, PoNumber, ProductId};
use crate::store::{Page, PoListQuery, PoSortKey, PoStore, PoSummary, ProductListQuery, SortDir};
use crate::{PoError, Result};

const PRODUCT_COLUMNS: &str = "id, part_number, name, base_price, retail_price, platform_id, main_category_id, category_id, vendor_id, colors, grease, anglefinders, hardware, hardware_packs, images, display";
const PO_COLUMNS: &str = "id, dealer_id, status, po_number, dealer_notes, admin_notes, created_at, sent_at, updated_at";
const LINE_COLUMNS: &str = "id, po_id, product_id, part_number, product_name, quantity, color_id, color_name, unit_price, grease_id, grease_name, anglefinder_id, anglefinder_name, hardware_id, hardware_name, hardware_pack_ids, position, created_at";

/// Attempts at get-or-create before giving up; each miss means a concurrent
/// request sent or created the draft between our insert and select.
const DRAFT_ATTEMPTS: usize = 3;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new().max_connections(max_connections).connect(database_url).await?;
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| PoError::Upstream(format!("migration failed: {e}")))
    }

    async fn require_po(&self, po_id: PoId) -> Result<PurchaseOrder> {
        self.find_purchase_order(po_id).await?.ok_or_else(|| PoError::not_found(format!("purchase order {po_id}")))
    }
}

// =============================================================================
// Row mapping
// =============================================================================

fn opt_id<T: NumericId>(raw: Option<i64>) -> Result<Option<T>> {
    raw.map(T::from_raw).transpose().map_err(|e| PoError::Upstream(format!("corrupt id in database: {e}")))
}

fn id<T: NumericId>(raw: i64) -> Result<T> {
    T::from_raw(raw).map_err(|e| PoError::Upstream(format!("corrupt id in database: {e}")))
}

fn raw_id<T: NumericId>(id: Option<T>) -> Option<i64> { id.map(NumericId::get) }

fn quantity_to_db(quantity: u32) -> Result<i32> {
    i32::try_from(quantity).map_err(|_| PoError::Validation(format!("quantity {quantity} is too large")))
}

fn parse_status(raw: &str) -> Result<PoStatus> {
    raw.parse().map_err(|e: PoError| PoError::Upstream(e.to_string()))
}

fn like_pattern(term: &str) -> String {
    let escaped = term.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
    format!("%{escaped}%")
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: i64,
    part_number: String,
    name: String,
    base_price: Decimal,
    retail_price: Decimal,
    platform_id: Option<i64>,
    main_category_id: Option<i64>,
    category_id: Option<i64>,
    vendor_id: Option<i64>,
    colors: String,
    grease: String,
    anglefinders: String,
    hardware: String,
    hardware_packs: String,
    images: Vec<String>,
    display: bool,
}

impl TryFrom<ProductRow> for Product {
    type Error = PoError;

    fn try_from(r: ProductRow) -> Result<Self> {
        Ok(Product {
            id: id(r.id)?,
            part_number: r.part_number,
            name: r.name,
            base_price: r.base_price,
            retail_price: r.retail_price,
            platform_id: opt_id(r.platform_id)?,
            main_category_id: opt_id(r.main_category_id)?,
            category_id: opt_id(r.category_id)?,
            vendor_id: opt_id(r.vendor_id)?,
            colors: IdList::parse(&r.colors),
            grease: IdList::parse(&r.grease),
            anglefinders: IdList::parse(&r.anglefinders),
            hardware: IdList::parse(&r.hardware),
            hardware_packs: IdList::parse(&r.hardware_packs),
            images: r.images,
            display: r.display,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CustomerRow {
    id: i64,
    name: String,
    business_name: Option<String>,
    email: String,
    role: String,
    dealer_tier: i16,
    dealer_discount: Option<Decimal>,
    billing_address: Option<Json<Address>>,
    shipping_address: Option<Json<Address>>,
}

impl TryFrom<CustomerRow> for Dealer {
    type Error = PoError;

    fn try_from(r: CustomerRow) -> Result<Self> {
        Ok(Dealer {
            id: id(r.id)?,
            name: r.name,
            business_name: r.business_name,
            email: r.email,
            role: CustomerRole::parse(&r.role),
            tier: u8::try_from(r.dealer_tier).unwrap_or(0),
            discount_percent: r.dealer_discount,
            billing_address: r.billing_address.map(|Json(a)| a),
            shipping_address: r.shipping_address.map(|Json(a)| a),
        })
    }
}

#[derive(sqlx::FromRow)]
struct PoRow {
    id: i64,
    dealer_id: i64,
    status: String,
    po_number: Option<i64>,
    dealer_notes: Option<String>,
    admin_notes: Option<String>,
    created_at: DateTime<Utc>,
    sent_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PoRow> for PurchaseOrder {
    type Error = PoError;

    fn try_from(r: PoRow) -> Result<Self> {
        Ok(PurchaseOrder {
            id: id(r.id)?,
            dealer_id: id(r.dealer_id)?,
            status: parse_status(&r.status)?,
            po_number: r.po_number.map(PoNumber::new),
            dealer_notes: r.dealer_notes,
            admin_notes: r.admin_notes,
            created_at: r.created_at,
            sent_at: r.sent_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct LineRow {
    id: i64,
    po_id: i64,
    product_id: i64,
    part_number: String,
    product_name: String,
    quantity: i32,
    color_id: Option<i64>,
    color_name: Option<String>,
    unit_price: Decimal,
    grease_id: Option<i64>,
    grease_name: Option<String>,
    anglefinder_id: Option<i64>,
    anglefinder_name: Option<String>,
    hardware_id: Option<i64>,
    hardware_name: Option<String>,
    hardware_pack_ids: Vec<i64>,
    position: i32,
    created_at: DateTime<Utc>,
}

impl TryFrom<LineRow> for PoLineItem {
    type Error = PoError;

    fn try_from(r: LineRow) -> Result<Self> {
        Ok(PoLineItem {
            id: id(r.id)?,
            po_id: id(r.po_id)?,
            product_id: id(r.product_id)?,
            part_number: r.part_number,
            product_name: r.product_name,
            quantity: u32::try_from(r.quantity).map_err(|_| PoError::Upstream(format!("line {} has quantity {}", r.id, r.quantity)))?,
            color_id: opt_id(r.color_id)?,
            color_name: r.color_name,
            unit_price: r.unit_price,
            grease_id: opt_id(r.grease_id)?,
            grease_name: r.grease_name,
            anglefinder_id: opt_id(r.anglefinder_id)?,
            anglefinder_name: r.anglefinder_name,
            hardware_id: opt_id(r.hardware_id)?,
            hardware_name: r.hardware_name,
            hardware_pack_ids: r.hardware_pack_ids.into_iter().map(id).collect::<Result<_>>()?,
            position: r.position,
            created_at: r.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PoSummaryRow {
    id: i64,
    po_number: Option<i64>,
    dealer_id: i64,
    dealer_name: Option<String>,
    business_name: Option<String>,
    tier: i16,
    status: String,
    line_count: i64,
    item_count: i64,
    subtotal: Decimal,
    created_at: DateTime<Utc>,
    sent_at: Option<DateTime<Utc>>,
}

impl TryFrom<PoSummaryRow> for PoSummary {
    type Error = PoError;

    fn try_from(r: PoSummaryRow) -> Result<Self> {
        Ok(PoSummary {
            id: id(r.id)?,
            po_number: r.po_number.map(PoNumber::new),
            dealer_id: id(r.dealer_id)?,
            dealer_name: r.dealer_name,
            business_name: r.business_name,
            tier: u8::try_from(r.tier).unwrap_or(0),
            status: parse_status(&r.status)?,
            line_count: r.line_count,
            item_count: r.item_count,
            subtotal: r.subtotal,
            created_at: r.created_at,
            sent_at: r.sent_at,
        })
    }
}

/// Locks the PO row for the rest of the transaction and requires draft status.
async fn lock_draft(conn: &mut PgConnection, po_id: PoId) -> Result<()> {
    let status: Option<String> = sqlx::query_scalar("SELECT status FROM purchase_orders WHERE id = $1 FOR UPDATE")
        .bind(po_id.get())
        .fetch_optional(&mut *conn)
        .await?;
    let status = parse_status(&status.ok_or_else(|| PoError::not_found(format!("purchase order {po_id}")))?)?;
    if status != PoStatus::Draft {
        return Err(PoError::PoAlreadySent(status));
    }
    Ok(())
}

/// Returns the dealer's draft locked for the rest of the transaction,
/// inserting it when the dealer has none.
async fn open_draft(conn: &mut PgConnection, dealer_id: DealerId) -> Result<PurchaseOrder> {
    let insert = format!(
        "INSERT INTO purchase_orders (dealer_id, status) VALUES ($1, 'draft') \
         ON CONFLICT (dealer_id) WHERE status = 'draft' DO NOTHING RETURNING {PO_COLUMNS}"
    );
    let select = format!("SELECT {PO_COLUMNS} FROM purchase_orders WHERE dealer_id = $1 AND status = 'draft' FOR UPDATE");

    for _ in 0..DRAFT_ATTEMPTS {
        if let Some(row) = sqlx::query_as::<_, PoRow>(&insert).bind(dealer_id.get()).fetch_optional(&mut *conn).await? {
            let po = PurchaseOrder::try_from(row)?;
            tracing::info!(po_id = %po.id, dealer_id = %dealer_id, "opened draft purchase order");
            return Ok(po);
        }
        if let Some(row) = sqlx::query_as::<_, PoRow>(&select).bind(dealer_id.get()).fetch_optional(&mut *conn).await? {
            return PurchaseOrder::try_from(row);
        }
    }
    Err(PoError::Upstream(format!("could not open a draft purchase order for dealer {dealer_id}")))
}

/// Inserts the line or grows the one with the same identity. The caller holds
/// the PO row lock; an error leaves the transaction to roll back on drop.
async fn merge_line(conn: &mut PgConnection, po_id: PoId, line: &NewLineItem, cap: u32) -> Result<PoLineItem> {
    let sql = format!(
        "INSERT INTO po_line_items (po_id, product_id, part_number, product_name, quantity, color_id, color_name, unit_price, \
             grease_id, grease_name, anglefinder_id, anglefinder_name, hardware_id, hardware_name, hardware_pack_ids, position) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, \
             (SELECT COALESCE(MAX(position), -1) + 1 FROM po_line_items WHERE po_id = $1)) \
         ON CONFLICT (po_id, product_id, (COALESCE(color_id, 0)), (COALESCE(grease_id, 0)), (COALESCE(anglefinder_id, 0)), (COALESCE(hardware_id, 0))) \
         DO UPDATE SET quantity = po_line_items.quantity + EXCLUDED.quantity \
         WHERE po_line_items.quantity + EXCLUDED.quantity <= $16 \
         RETURNING {LINE_COLUMNS}"
    );
    let row = sqlx::query_as::<_, LineRow>(&sql)
        .bind(po_id.get())
        .bind(line.product_id.get())
        .bind(&line.part_number)
        .bind(&line.product_name)
        .bind(quantity_to_db(line.quantity)?)
        .bind(raw_id(line.color_id))
        .bind(&line.color_name)
        .bind(line.unit_price)
        .bind(raw_id(line.grease_id))
        .bind(&line.grease_name)
        .bind(raw_id(line.anglefinder_id))
        .bind(&line.anglefinder_name)
        .bind(raw_id(line.hardware_id))
        .bind(&line.hardware_name)
        .bind(line.hardware_pack_ids.iter().map(|id| id.get()).collect::<Vec<i64>>())
        .bind(quantity_to_db(cap)?)
        .fetch_optional(&mut *conn)
        .await?;

    if let Some(row) = row {
        return PoLineItem::try_from(row);
    }
    // The conflict branch declined the update: the merged total would pass the cap.
    let existing: i32 = sqlx::query_scalar(
        "SELECT quantity FROM po_line_items WHERE po_id = $1 AND product_id = $2 \
         AND COALESCE(color_id, 0) = $3 AND COALESCE(grease_id, 0) = $4 \
         AND COALESCE(anglefinder_id, 0) = $5 AND COALESCE(hardware_id, 0) = $6",
    )
    .bind(po_id.get())
    .bind(line.product_id.get())
    .bind(raw_id(line.color_id).unwrap_or(0))
    .bind(raw_id(line.grease_id).unwrap_or(0))
    .bind(raw_id(line.anglefinder_id).unwrap_or(0))
    .bind(raw_id(line.hardware_id).unwrap_or(0))
    .fetch_one(&mut *conn)
    .await?;
    merge_quantity(u32::try_from(existing).unwrap_or(0), line.quantity, cap)?;
    Err(PoError::Upstream("line upsert returned no row".into()))
}

fn push_product_filters(qb: &mut QueryBuilder<'_, Postgres>, query: &ProductListQuery) {
    qb.push(" WHERE display");
    if let Some(term) = query.search_term() {
        let pattern = like_pattern(&term);
        qb.push(" AND (name ILIKE ").push_bind(pattern.clone()).push(" OR part_number ILIKE ").push_bind(pattern).push(")");
    }
    if let Some(body) = query.body_id {
        qb.push(" AND platform_id = ").push_bind(body.get());
    }
    if let Some(main) = query.main_cat_id {
        qb.push(" AND main_category_id = ").push_bind(main.get());
    }
    if let Some(cat) = query.cat_id {
        qb.push(" AND category_id = ").push_bind(cat.get());
    }
    if let Some(vendor) = query.vendor_id {
        qb.push(" AND vendor_id = ").push_bind(vendor.get());
    }
}

fn push_po_filters(qb: &mut QueryBuilder<'_, Postgres>, query: &PoListQuery, po_term: Option<i64>) {
    qb.push(" WHERE TRUE");
    if let Some(term) = query.customer_term() {
        let pattern = like_pattern(&term);
        qb.push(" AND (c.name ILIKE ").push_bind(pattern.clone()).push(" OR c.business_name ILIKE ").push_bind(pattern).push(")");
    }
    if let Some(n) = po_term {
        qb.push(" AND (po.id = ").push_bind(n).push(" OR po.po_number = ").push_bind(n).push(")");
    }
    if let Some(status) = query.status {
        qb.push(" AND po.status = ").push_bind(status.as_str());
    }
    if let Some(from) = query.from {
        qb.push(" AND po.created_at::date >= ").push_bind(from);
    }
    if let Some(to) = query.to {
        qb.push(" AND po.created_at::date <= ").push_bind(to);
    }
}

fn sort_clause(key: PoSortKey, dir: SortDir) -> String {
    let column = match key {
        PoSortKey::Id => "po.id",
        PoSortKey::Dealer => "LOWER(c.name)",
        PoSortKey::Tier => "tier",
        PoSortKey::Status => "po.status",
        PoSortKey::Items => "item_count",
        PoSortKey::Subtotal => "subtotal",
        PoSortKey::Sent => "po.sent_at",
        PoSortKey::Created => "po.created_at",
    };
    // Missing values sort lowest in either direction.
    let dir = match dir {
        SortDir::Asc => "ASC NULLS FIRST",
        SortDir::Desc => "DESC NULLS LAST",
    };
    format!(" ORDER BY {column} {dir}, po.id ASC")
}

#[async_trait]
impl PoStore for PgStore {
    async fn reference_data(&self) -> Result<ReferenceData> {
        let platforms = sqlx::query_as::<_, (i64, String, Option<i32>, Option<i32>)>("SELECT id, name, start_year, end_year FROM platforms ORDER BY id")
            .fetch_all(&self.pool).await?
            .into_iter()
            .map(|(pid, name, start_year, end_year)| -> Result<Platform> { Ok(Platform { id: id(pid)?, name, start_year, end_year }) })
            .collect::<Result<_>>()?;
        let main_categories = sqlx::query_as::<_, (i64, String, Option<i64>)>("SELECT id, name, platform_id FROM main_categories ORDER BY id")
            .fetch_all(&self.pool).await?
            .into_iter()
            .map(|(cid, name, platform)| -> Result<MainCategory> { Ok(MainCategory { id: id(cid)?, name, platform_id: opt_id(platform)? }) })
            .collect::<Result<_>>()?;
        let categories = sqlx::query_as::<_, (i64, String, Option<i64>)>("SELECT id, name, main_category_id FROM categories ORDER BY id")
            .fetch_all(&self.pool).await?
            .into_iter()
            .map(|(cid, name, main)| -> Result<Category> { Ok(Category { id: id(cid)?, name, main_category_id: opt_id(main)? }) })
            .collect::<Result<_>>()?;
        let vendors = sqlx::query_as::<_, (i64, String)>("SELECT id, name FROM vendors ORDER BY id")
            .fetch_all(&self.pool).await?
            .into_iter()
            .map(|(vid, name)| -> Result<Vendor> { Ok(Vendor { id: id(vid)?, name }) })
            .collect::<Result<_>>()?;
        let colors = sqlx::query_as::<_, (i64, String)>("SELECT id, name FROM colors ORDER BY id")
            .fetch_all(&self.pool).await?
            .into_iter()
            .map(|(cid, name)| -> Result<Color> { Ok(Color { id: id(cid)?, name }) })
            .collect::<Result<_>>()?;
        let add_ons = sqlx::query_as::<_, (i64, String, String, Option<String>, Decimal)>("SELECT id, kind, name, part_number, price FROM add_ons ORDER BY id")
            .fetch_all(&self.pool).await?
            .into_iter()
            .filter_map(|(aid, kind, name, part_number, price)| match AddOnKind::parse(&kind) {
                Some(kind) => Some(id(aid).map(|id| AddOn { id, kind, name, part_number, price })),
                None => {
                    tracing::warn!(add_on_id = aid, %kind, "skipping add-on of unknown kind");
                    None
                }
            })
            .collect::<Result<_>>()?;
        let tiers = sqlx::query_as::<_, (i16, Decimal)>("SELECT tier, discount_percent FROM dealer_tiers ORDER BY tier")
            .fetch_all(&self.pool).await?
            .into_iter()
            .map(|(tier, discount_percent)| DealerTier { tier: u8::try_from(tier).unwrap_or(0), discount_percent })
            .collect();

        Ok(ReferenceData { platforms, main_categories, categories, vendors, colors, add_ons, tiers })
    }

    async fn find_dealer(&self, dealer_id: DealerId) -> Result<Option<Dealer>> {
        sqlx::query_as::<_, CustomerRow>(
            "SELECT id, name, business_name, email, role, dealer_tier, dealer_discount, billing_address, shipping_address FROM customers WHERE id = $1 AND role = 'dealer'",
        )
        .bind(dealer_id.get())
        .fetch_optional(&self.pool)
        .await?
        .map(Dealer::try_from)
        .transpose()
    }

    async fn find_product(&self, product_id: ProductId) -> Result<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1");
        sqlx::query_as::<_, ProductRow>(&sql)
            .bind(product_id.get())
            .fetch_optional(&self.pool)
            .await?
            .map(Product::try_from)
            .transpose()
    }

    async fn list_products(&self, query: &ProductListQuery) -> Result<Page<Product>> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM products");
        push_product_filters(&mut count, query);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(format!("SELECT {PRODUCT_COLUMNS} FROM products"));
        push_product_filters(&mut select, query);
        select
            .push(" ORDER BY id LIMIT ")
            .push_bind(i64::from(query.limit()))
            .push(" OFFSET ")
            .push_bind(i64::from(query.offset()));
        let data = select
            .build_query_as::<ProductRow>()
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Product::try_from)
            .collect::<Result<_>>()?;

        Ok(Page { data, total, limit: query.limit(), offset: query.offset() })
    }

    async fn get_or_create_draft(&self, dealer_id: DealerId) -> Result<PurchaseOrder> {
        let mut tx = self.pool.begin().await?;
        let po = open_draft(&mut *tx, dealer_id).await?;
        tx.commit().await?;
        Ok(po)
    }

    async fn find_purchase_order(&self, po_id: PoId) -> Result<Option<PurchaseOrder>> {
        let sql = format!("SELECT {PO_COLUMNS} FROM purchase_orders WHERE id = $1");
        sqlx::query_as::<_, PoRow>(&sql)
            .bind(po_id.get())
            .fetch_optional(&self.pool)
            .await?
            .map(PurchaseOrder::try_from)
            .transpose()
    }

    async fn line_items(&self, po_id: PoId) -> Result<Vec<PoLineItem>> {
        let sql = format!("SELECT {LINE_COLUMNS} FROM po_line_items WHERE po_id = $1 ORDER BY position, id");
        sqlx::query_as::<_, LineRow>(&sql)
            .bind(po_id.get())
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(PoLineItem::try_from)
            .collect()
    }

    async fn upsert_line(&self, po_id: PoId, line: NewLineItem, cap: u32) -> Result<PoLineItem> {
        check_quantity(line.quantity, cap)?;
        let mut tx = self.pool.begin().await?;
        lock_draft(&mut *tx, po_id).await?;
        let item = merge_line(&mut *tx, po_id, &line, cap).await?;
        tx.commit().await?;
        Ok(item)
    }

    async fn upsert_draft_line(&self, dealer_id: DealerId, line: NewLineItem, cap: u32) -> Result<PoLineItem> {
        check_quantity(line.quantity, cap)?;
        let mut tx = self.pool.begin().await?;
        let po = open_draft(&mut *tx, dealer_id).await?;
        let item = merge_line(&mut *tx, po.id, &line, cap).await?;
        tx.commit().await?;
        Ok(item)
    }

    async fn set_line_quantity(&self, po_id: PoId, line_id: LineItemId, quantity: u32) -> Result<PoLineItem> {
        let mut tx = self.pool.begin().await?;
        lock_draft(&mut *tx, po_id).await?;
        let sql = format!("UPDATE po_line_items SET quantity = $3 WHERE id = $1 AND po_id = $2 RETURNING {LINE_COLUMNS}");
        let row = sqlx::query_as::<_, LineRow>(&sql)
            .bind(line_id.get())
            .bind(po_id.get())
            .bind(quantity_to_db(quantity)?)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| PoError::not_found(format!("line item {line_id} on purchase order {po_id}")))?;
        tx.commit().await?;
        PoLineItem::try_from(row)
    }

    async fn delete_line(&self, po_id: PoId, line_id: LineItemId) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        lock_draft(&mut *tx, po_id).await?;
        let deleted = sqlx::query("DELETE FROM po_line_items WHERE id = $1 AND po_id = $2")
            .bind(line_id.get())
            .bind(po_id.get())
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if deleted == 0 {
            return Err(PoError::not_found(format!("line item {line_id} on purchase order {po_id}")));
        }
        tx.commit().await?;
        Ok(())
    }

    async fn set_line_positions(&self, po_id: PoId, ordered: &[LineItemId]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        lock_draft(&mut *tx, po_id).await?;
        let current: Vec<i64> = sqlx::query_scalar("SELECT id FROM po_line_items WHERE po_id = $1 ORDER BY position, id")
            .bind(po_id.get())
            .fetch_all(&mut *tx)
            .await?;
        let ordered: Vec<i64> = ordered.iter().map(|id| id.get()).collect();
        if let Some(stray) = ordered.iter().find(|id| !current.contains(id)) {
            return Err(PoError::InvalidSelection(format!("line item {stray} does not belong to purchase order {po_id}")));
        }
        let ids: Vec<i64> = ordered.iter().copied().chain(current.into_iter().filter(|id| !ordered.contains(id))).collect();
        let positions: Vec<i32> = (0..ids.len()).map(|p| p as i32).collect();
        sqlx::query(
            "UPDATE po_line_items AS li SET position = u.position \
             FROM UNNEST($1::BIGINT[], $2::INT[]) AS u(id, position) \
             WHERE li.id = u.id AND li.po_id = $3",
        )
        .bind(ids)
        .bind(positions)
        .bind(po_id.get())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn mark_sent(&self, po_id: PoId, dealer_notes: Option<String>) -> Result<PurchaseOrder> {
        let sql = format!(
            "UPDATE purchase_orders SET status = 'sent', po_number = nextval('po_number_seq'), sent_at = NOW(), \
                 updated_at = NOW(), dealer_notes = COALESCE($2, dealer_notes) \
             WHERE id = $1 AND status = 'draft' AND EXISTS (SELECT 1 FROM po_line_items WHERE po_id = $1) \
             RETURNING {PO_COLUMNS}"
        );
        if let Some(row) = sqlx::query_as::<_, PoRow>(&sql).bind(po_id.get()).bind(dealer_notes).fetch_optional(&self.pool).await? {
            return PurchaseOrder::try_from(row);
        }
        // Nothing matched: report why.
        let po = self.require_po(po_id).await?;
        let line_count = self.line_items(po_id).await?.len();
        po.ensure_sendable(line_count)?;
        Err(PoError::InvalidState(format!("purchase order {po_id} changed while sending")))
    }

    async fn transition_status(&self, po_id: PoId, from: PoStatus, to: PoStatus, admin_notes: Option<String>) -> Result<PurchaseOrder> {
        let sql = format!(
            "UPDATE purchase_orders SET status = $3, admin_notes = COALESCE($4, admin_notes), updated_at = NOW() \
             WHERE id = $1 AND status = $2 RETURNING {PO_COLUMNS}"
        );
        let row = sqlx::query_as::<_, PoRow>(&sql)
            .bind(po_id.get())
            .bind(from.as_str())
            .bind(to.as_str())
            .bind(admin_notes)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => PurchaseOrder::try_from(row),
            None => {
                let po = self.require_po(po_id).await?;
                Err(PoError::InvalidState(format!("purchase order {po_id} is now {}, expected {from}", po.status)))
            }
        }
    }

    async fn set_admin_notes(&self, po_id: PoId, notes: Option<String>) -> Result<PurchaseOrder> {
        let sql = format!("UPDATE purchase_orders SET admin_notes = $2, updated_at = NOW() WHERE id = $1 RETURNING {PO_COLUMNS}");
        sqlx::query_as::<_, PoRow>(&sql)
            .bind(po_id.get())
            .bind(notes)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| PoError::not_found(format!("purchase order {po_id}")))
            .and_then(PurchaseOrder::try_from)
    }

    async fn list_purchase_orders(&self, query: &PoListQuery) -> Result<Page<PoSummary>> {
        let po_term = query.po_term().transpose()?;

        let mut count = QueryBuilder::<Postgres>::new(
            "SELECT COUNT(*) FROM purchase_orders po LEFT JOIN customers c ON c.id = po.dealer_id",
        );
        push_po_filters(&mut count, query, po_term);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(
            "SELECT po.id, po.po_number, po.dealer_id, c.name AS dealer_name, c.business_name, \
                 COALESCE(c.dealer_tier, 0::SMALLINT) AS tier, po.status, \
                 COUNT(li.id) AS line_count, COALESCE(SUM(li.quantity), 0)::BIGINT AS item_count, \
                 COALESCE(SUM(li.unit_price * li.quantity), 0)::NUMERIC(14, 2) AS subtotal, \
                 po.created_at, po.sent_at \
             FROM purchase_orders po \
             LEFT JOIN customers c ON c.id = po.dealer_id \
             LEFT JOIN po_line_items li ON li.po_id = po.id",
        );
        push_po_filters(&mut select, query, po_term);
        select.push(" GROUP BY po.id, c.id");
        select.push(sort_clause(query.sort, query.dir));
        select
            .push(" LIMIT ")
            .push_bind(i64::from(query.limit()))
            .push(" OFFSET ")
            .push_bind(i64::from(query.offset()));

        let data = select
            .build_query_as::<PoSummaryRow>()
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(PoSummary::try_from)
            .collect::<Result<_>>()?;

        Ok(Page { data, total, limit: query.limit(), offset: query.offset() })
    }

    async fn completed_orders(&self, dealer_id: DealerId) -> Result<Vec<OrderSummary>> {
        sqlx::query_as::<_, (i64, i64, i64, String, i32, Decimal, DateTime<Utc>)>(
            "SELECT id, order_number, customer_id, status, item_count, total, created_at FROM orders \
             WHERE customer_id = $1 AND status IN ('shipped', 'completed') \
             ORDER BY created_at DESC, id DESC",
        )
        .bind(dealer_id.get())
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|(oid, number, customer, status, item_count, total, created_at)| -> Result<OrderSummary> {
            Ok(OrderSummary {
                id: oid,
                order_number: OrderNumber::new(number),
                customer_id: id(customer)?,
                status: OrderStatus::parse(&status),
                item_count: u32::try_from(item_count).unwrap_or(0),
                total,
                created_at,
            })
        })
        .collect()
    }
}
