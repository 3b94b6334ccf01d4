//! Product catalogue persistence.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, types::Type, OptionalExtension, Row};
use tracing::debug;

use super::{parse_column, Storage};
use crate::error::{Error, Result};
use crate::model::{NewProduct, Product, Promotion};

const PRODUCT_COLUMNS: &str = "id, product_code, name, category, standard_price, cost_price, \
     promo_price, promo_start, promo_end, is_active, description, specifications, \
     total_quoted, total_sold, created_at, updated_at";

impl Storage {
    /// Register a product.
    ///
    /// # Errors
    ///
    /// Returns a validation error for bad fields or a product code that is
    /// already taken.
    pub fn insert_product(&self, new: &NewProduct, now: DateTime<Utc>) -> Result<Product> {
        new.validate()?;
        let code = new.product_code.trim();
        if self.find_product(code)?.is_some() {
            return Err(Error::validation(format!("product code '{code}' already exists")));
        }
        let specifications = if new.specifications.is_null() {
            serde_json::json!({})
        } else {
            new.specifications.clone()
        };

        self.conn.execute(
            "INSERT INTO products (product_code, name, category, standard_price, cost_price,
                 promo_price, promo_start, promo_end, is_active, description, specifications,
                 created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1, ?9, ?10, ?11, ?11)",
            params![
                code,
                new.name.trim(),
                new.category.as_str(),
                new.standard_price,
                new.cost_price,
                new.promotion.map(|p| p.price),
                new.promotion.map(|p| p.start),
                new.promotion.map(|p| p.end),
                new.description,
                serde_json::to_string(&specifications)?,
                now,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        debug!("Inserted product {} ({})", id, code);
        self.require_product(id)
    }

    /// Overwrite every mutable column of a product.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when the product does not exist.
    pub fn save_product(&self, product: &Product) -> Result<()> {
        let affected = self.conn.execute(
            "UPDATE products SET name = ?2, category = ?3, standard_price = ?4, cost_price = ?5,
                 promo_price = ?6, promo_start = ?7, promo_end = ?8, is_active = ?9,
                 description = ?10, specifications = ?11, total_quoted = ?12, total_sold = ?13,
                 updated_at = ?14
             WHERE id = ?1",
            params![
                product.id,
                product.name,
                product.category.as_str(),
                product.standard_price,
                product.cost_price,
                product.promotion.map(|p| p.price),
                product.promotion.map(|p| p.start),
                product.promotion.map(|p| p.end),
                product.is_active,
                product.description,
                serde_json::to_string(&product.specifications)?,
                product.total_quoted,
                product.total_sold,
                product.updated_at,
            ],
        )?;
        if affected == 0 {
            return Err(Error::not_found("product", product.id));
        }
        Ok(())
    }

    /// Get a product by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_product(&self, id: i64) -> Result<Option<Product>> {
        let product = self
            .conn
            .query_row(
                &format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1"),
                [id],
                row_to_product,
            )
            .optional()?;
        Ok(product)
    }

    /// Get a product by id, failing when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id.
    pub fn require_product(&self, id: i64) -> Result<Product> {
        self.get_product(id)?
            .ok_or_else(|| Error::not_found("product", id))
    }

    /// Look up a product by its catalogue code.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn find_product(&self, code: &str) -> Result<Option<Product>> {
        let product = self
            .conn
            .query_row(
                &format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE product_code = ?1"),
                [code],
                row_to_product,
            )
            .optional()?;
        Ok(product)
    }

    /// Products by category and name.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_products(&self, active_only: bool) -> Result<Vec<Product>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products
             WHERE (?1 = 0 OR is_active = 1)
             ORDER BY category, name"
        ))?;
        let products = stmt
            .query_map([active_only], row_to_product)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(products)
    }
}

fn row_to_product(row: &Row<'_>) -> rusqlite::Result<Product> {
    let promo_price: Option<i64> = row.get(6)?;
    let promo_start: Option<NaiveDate> = row.get(7)?;
    let promo_end: Option<NaiveDate> = row.get(8)?;
    let promotion = match (promo_price, promo_start, promo_end) {
        (Some(price), Some(start), Some(end)) => Some(Promotion { price, start, end }),
        _ => None,
    };
    let specs_json: String = row.get(11)?;
    let specifications = serde_json::from_str(&specs_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(11, Type::Text, Box::new(e)))?;

    Ok(Product {
        id: row.get(0)?,
        product_code: row.get(1)?,
        name: row.get(2)?,
        category: parse_column(row, 3)?,
        standard_price: row.get(4)?,
        cost_price: row.get(5)?,
        promotion,
        is_active: row.get(9)?,
        description: row.get(10)?,
        specifications,
        total_quoted: row.get(12)?,
        total_sold: row.get(13)?,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
    })
}
