//! Companies, departments and customers.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use tracing::debug;

use super::{parse_column, parse_optional_column, Storage};
use crate::error::{Error, Result};
use crate::model::{Company, Customer, Department, Grade, NewCustomer};

const CUSTOMER_COLUMNS: &str = "id, owner, customer_name, company_id, department_id, manager, \
     phone, email, address, notes, status, priority, grade, grade_score, grade_reasoning, \
     grade_updated_at, created_at, updated_at";

impl Storage {
    /// Insert a company.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a blank or duplicate name.
    pub fn insert_company(&self, name: &str, now: DateTime<Utc>) -> Result<Company> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::validation("company name cannot be empty"));
        }
        if self.find_company(name)?.is_some() {
            return Err(Error::validation(format!("company '{name}' already exists")));
        }

        self.conn.execute(
            "INSERT INTO companies (name, created_at) VALUES (?1, ?2)",
            params![name, now],
        )?;
        let id = self.conn.last_insert_rowid();
        debug!("Inserted company {} ({})", id, name);

        Ok(Company {
            id,
            name: name.to_string(),
            created_at: now,
        })
    }

    /// Look up a company by exact name.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn find_company(&self, name: &str) -> Result<Option<Company>> {
        let company = self
            .conn
            .query_row(
                "SELECT id, name, created_at FROM companies WHERE name = ?1",
                [name],
                row_to_company,
            )
            .optional()?;
        Ok(company)
    }

    /// Get a company by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_company(&self, id: i64) -> Result<Option<Company>> {
        let company = self
            .conn
            .query_row(
                "SELECT id, name, created_at FROM companies WHERE id = ?1",
                [id],
                row_to_company,
            )
            .optional()?;
        Ok(company)
    }

    /// All companies by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_companies(&self) -> Result<Vec<Company>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, created_at FROM companies ORDER BY name")?;
        let companies = stmt
            .query_map([], row_to_company)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(companies)
    }

    /// Insert a department under a company.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown company and a validation error for
    /// a blank or duplicate name.
    pub fn insert_department(
        &self,
        company_id: i64,
        name: &str,
        now: DateTime<Utc>,
    ) -> Result<Department> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::validation("department name cannot be empty"));
        }
        if self.get_company(company_id)?.is_none() {
            return Err(Error::not_found("company", company_id));
        }
        let exists: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM departments WHERE company_id = ?1 AND name = ?2",
            params![company_id, name],
            |row| row.get(0),
        )?;
        if exists > 0 {
            return Err(Error::validation(format!(
                "department '{name}' already exists in company {company_id}"
            )));
        }

        self.conn.execute(
            "INSERT INTO departments (company_id, name, created_at) VALUES (?1, ?2, ?3)",
            params![company_id, name, now],
        )?;

        Ok(Department {
            id: self.conn.last_insert_rowid(),
            company_id,
            name: name.to_string(),
            created_at: now,
        })
    }

    /// Get a department by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_department(&self, id: i64) -> Result<Option<Department>> {
        let department = self
            .conn
            .query_row(
                "SELECT id, company_id, name, created_at FROM departments WHERE id = ?1",
                [id],
                row_to_department,
            )
            .optional()?;
        Ok(department)
    }

    /// Departments, optionally limited to one company.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_departments(&self, company_id: Option<i64>) -> Result<Vec<Department>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, company_id, name, created_at FROM departments
             WHERE ?1 IS NULL OR company_id = ?1
             ORDER BY company_id, name",
        )?;
        let departments = stmt
            .query_map([company_id], row_to_department)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(departments)
    }

    /// Insert a customer.
    ///
    /// # Errors
    ///
    /// Returns a validation error for malformed fields or a department that
    /// belongs to another company, and `NotFound` for unknown references.
    pub fn insert_customer(&self, new: &NewCustomer, now: DateTime<Utc>) -> Result<Customer> {
        new.validate()?;
        let department = self
            .get_department(new.department_id)?
            .ok_or_else(|| Error::not_found("department", new.department_id))?;
        if department.company_id != new.company_id {
            return Err(Error::validation(format!(
                "department {} does not belong to company {}",
                department.id, new.company_id
            )));
        }

        self.conn.execute(
            "INSERT INTO customers (owner, customer_name, company_id, department_id, manager,
                 phone, email, address, notes, status, priority, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)",
            params![
                new.owner,
                new.customer_name,
                new.company_id,
                new.department_id,
                new.manager,
                new.phone,
                new.email,
                new.address,
                new.notes,
                new.status.as_str(),
                new.priority.as_str(),
                now,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        debug!("Inserted customer {}", id);

        self.require_customer(id)
    }

    /// Get a customer by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_customer(&self, id: i64) -> Result<Option<Customer>> {
        let customer = self
            .conn
            .query_row(
                &format!("SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = ?1"),
                [id],
                row_to_customer,
            )
            .optional()?;
        Ok(customer)
    }

    /// Get a customer by id, failing when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id.
    pub fn require_customer(&self, id: i64) -> Result<Customer> {
        self.get_customer(id)?
            .ok_or_else(|| Error::not_found("customer", id))
    }

    /// Customers, optionally limited to one owner.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_customers(&self, owner: Option<&str>) -> Result<Vec<Customer>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers
             WHERE ?1 IS NULL OR owner = ?1
             ORDER BY id"
        ))?;
        let customers = stmt
            .query_map([owner], row_to_customer)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(customers)
    }

    /// Store a computed grade on a customer.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id.
    pub fn update_customer_grade(
        &self,
        id: i64,
        grade: Grade,
        score: u8,
        reasoning: &str,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let affected = self.conn.execute(
            "UPDATE customers
             SET grade = ?2, grade_score = ?3, grade_reasoning = ?4,
                 grade_updated_at = ?5, updated_at = ?5
             WHERE id = ?1",
            params![id, grade.as_str(), score, reasoning, at],
        )?;
        if affected == 0 {
            return Err(Error::not_found("customer", id));
        }
        Ok(())
    }
}

fn row_to_company(row: &Row<'_>) -> rusqlite::Result<Company> {
    Ok(Company {
        id: row.get(0)?,
        name: row.get(1)?,
        created_at: row.get(2)?,
    })
}

fn row_to_department(row: &Row<'_>) -> rusqlite::Result<Department> {
    Ok(Department {
        id: row.get(0)?,
        company_id: row.get(1)?,
        name: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn row_to_customer(row: &Row<'_>) -> rusqlite::Result<Customer> {
    Ok(Customer {
        id: row.get(0)?,
        owner: row.get(1)?,
        customer_name: row.get(2)?,
        company_id: row.get(3)?,
        department_id: row.get(4)?,
        manager: row.get(5)?,
        phone: row.get(6)?,
        email: row.get(7)?,
        address: row.get(8)?,
        notes: row.get(9)?,
        status: parse_column(row, 10)?,
        priority: parse_column(row, 11)?,
        grade: parse_optional_column(row, 12)?,
        grade_score: row.get(13)?,
        grade_reasoning: row.get(14)?,
        grade_updated_at: row.get(15)?,
        created_at: row.get(16)?,
        updated_at: row.get(17)?,
    })
}
