//! `SQLite` schema definitions for salesnote.
//!
//! Dates are stored as `YYYY-MM-DD` text, times as `HH:MM:SS`, and
//! timestamps as RFC 3339. Amounts are whole won in `INTEGER` columns.

/// Companies.
pub const CREATE_COMPANIES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS companies (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL
)
";

/// Departments, unique per company.
pub const CREATE_DEPARTMENTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS departments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    company_id INTEGER NOT NULL REFERENCES companies(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE (company_id, name)
)
";

/// Customers (follow-ups).
pub const CREATE_CUSTOMERS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS customers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner TEXT NOT NULL,
    customer_name TEXT,
    company_id INTEGER NOT NULL REFERENCES companies(id) ON DELETE CASCADE,
    department_id INTEGER NOT NULL REFERENCES departments(id) ON DELETE CASCADE,
    manager TEXT,
    phone TEXT,
    email TEXT,
    address TEXT,
    notes TEXT,
    status TEXT NOT NULL DEFAULT 'active',
    priority TEXT NOT NULL DEFAULT 'long_term',
    grade TEXT,
    grade_score INTEGER,
    grade_reasoning TEXT,
    grade_updated_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
";

/// Opportunities. `stage_history` is a JSON array of stage entries.
pub const CREATE_OPPORTUNITIES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS opportunities (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    customer_id INTEGER NOT NULL REFERENCES customers(id) ON DELETE CASCADE,
    title TEXT,
    current_stage TEXT NOT NULL DEFAULT 'lead',
    stage_entry_date TEXT NOT NULL,
    expected_revenue INTEGER NOT NULL DEFAULT 0,
    weighted_revenue INTEGER NOT NULL DEFAULT 0,
    backlog_amount INTEGER NOT NULL DEFAULT 0,
    probability INTEGER NOT NULL DEFAULT 10,
    expected_close_date TEXT,
    stage_history TEXT NOT NULL DEFAULT '[]',
    total_quotes_sent INTEGER NOT NULL DEFAULT 0,
    total_meetings INTEGER NOT NULL DEFAULT 0,
    won_date TEXT,
    lost_date TEXT,
    lost_reason TEXT,
    actual_revenue INTEGER,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
";

/// Schedules. Deleting an opportunity only unlinks its schedules.
pub const CREATE_SCHEDULES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS schedules (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner TEXT NOT NULL,
    customer_id INTEGER NOT NULL REFERENCES customers(id) ON DELETE CASCADE,
    opportunity_id INTEGER REFERENCES opportunities(id) ON DELETE SET NULL,
    visit_date TEXT NOT NULL,
    visit_time TEXT NOT NULL,
    location TEXT,
    status TEXT NOT NULL DEFAULT 'scheduled',
    activity_type TEXT NOT NULL DEFAULT 'customer_meeting',
    notes TEXT,
    expected_revenue INTEGER,
    probability INTEGER,
    expected_close_date TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
";

/// History entries.
pub const CREATE_HISTORIES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS histories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner TEXT NOT NULL,
    customer_id INTEGER REFERENCES customers(id) ON DELETE CASCADE,
    schedule_id INTEGER REFERENCES schedules(id) ON DELETE SET NULL,
    parent_id INTEGER REFERENCES histories(id) ON DELETE CASCADE,
    action_type TEXT NOT NULL,
    service_status TEXT,
    content TEXT,
    delivery_amount INTEGER,
    delivery_items_text TEXT,
    delivery_date TEXT,
    meeting_date TEXT,
    tax_invoice_issued INTEGER NOT NULL DEFAULT 0,
    created_by TEXT,
    created_at TEXT NOT NULL
)
";

/// Delivery items.
pub const CREATE_DELIVERY_ITEMS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS delivery_items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    schedule_id INTEGER REFERENCES schedules(id) ON DELETE CASCADE,
    history_id INTEGER REFERENCES histories(id) ON DELETE CASCADE,
    item_name TEXT NOT NULL,
    quantity INTEGER NOT NULL DEFAULT 1,
    unit TEXT NOT NULL DEFAULT '개',
    unit_price INTEGER,
    total_price INTEGER,
    tax_invoice_issued INTEGER NOT NULL DEFAULT 0,
    notes TEXT,
    created_at TEXT NOT NULL,
    CHECK (schedule_id IS NOT NULL OR history_id IS NOT NULL)
)
";

/// Index for listing a customer's schedules by date.
pub const CREATE_SCHEDULE_CUSTOMER_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_schedules_customer ON schedules(customer_id, visit_date DESC)
";

/// Index for revenue aggregation per opportunity.
pub const CREATE_SCHEDULE_OPPORTUNITY_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_schedules_opportunity ON schedules(opportunity_id)
";

/// Index for a customer's opportunities.
pub const CREATE_OPPORTUNITY_CUSTOMER_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_opportunities_customer ON opportunities(customer_id)
";

/// Index for funnel reports by stage.
pub const CREATE_OPPORTUNITY_STAGE_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_opportunities_stage ON opportunities(current_stage)
";

/// Index for a schedule's histories.
pub const CREATE_HISTORY_SCHEDULE_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_histories_schedule ON histories(schedule_id)
";

/// Index for items by schedule.
pub const CREATE_ITEM_SCHEDULE_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_items_schedule ON delivery_items(schedule_id)
";

/// Index for items by history.
pub const CREATE_ITEM_HISTORY_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_items_history ON delivery_items(history_id)
";

/// Product catalogue. `specifications` is a JSON object.
pub const CREATE_PRODUCTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS products (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    product_code TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    category TEXT NOT NULL DEFAULT 'other',
    standard_price INTEGER NOT NULL DEFAULT 0,
    cost_price INTEGER,
    promo_price INTEGER,
    promo_start TEXT,
    promo_end TEXT,
    is_active INTEGER NOT NULL DEFAULT 1,
    description TEXT,
    specifications TEXT NOT NULL DEFAULT '{}',
    total_quoted INTEGER NOT NULL DEFAULT 0,
    total_sold INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    CHECK ((promo_price IS NULL) = (promo_start IS NULL) AND (promo_start IS NULL) = (promo_end IS NULL))
)
";

/// Quotes. A quote goes with its schedule; a deleted delivery only unlinks it.
pub const CREATE_QUOTES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS quotes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    quote_number TEXT NOT NULL UNIQUE,
    schedule_id INTEGER NOT NULL REFERENCES schedules(id) ON DELETE CASCADE,
    customer_id INTEGER NOT NULL REFERENCES customers(id) ON DELETE CASCADE,
    owner TEXT NOT NULL,
    quote_date TEXT NOT NULL,
    valid_until TEXT NOT NULL,
    stage TEXT NOT NULL DEFAULT 'draft',
    subtotal INTEGER NOT NULL DEFAULT 0,
    discount_rate INTEGER NOT NULL DEFAULT 0,
    discount_amount INTEGER NOT NULL DEFAULT 0,
    tax_amount INTEGER NOT NULL DEFAULT 0,
    total_amount INTEGER NOT NULL DEFAULT 0,
    probability INTEGER NOT NULL DEFAULT 50,
    expected_close_date TEXT,
    weighted_revenue INTEGER NOT NULL DEFAULT 0,
    converted_to_delivery INTEGER NOT NULL DEFAULT 0,
    converted_history_id INTEGER REFERENCES histories(id) ON DELETE SET NULL,
    notes TEXT,
    customer_feedback TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
";

/// Quote lines. A product on a quote cannot be deleted.
pub const CREATE_QUOTE_ITEMS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS quote_items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    quote_id INTEGER NOT NULL REFERENCES quotes(id) ON DELETE CASCADE,
    product_id INTEGER NOT NULL REFERENCES products(id) ON DELETE RESTRICT,
    quantity INTEGER NOT NULL DEFAULT 1,
    unit_price INTEGER NOT NULL,
    discount_rate INTEGER NOT NULL DEFAULT 0,
    subtotal INTEGER NOT NULL,
    description TEXT,
    sort_order INTEGER NOT NULL DEFAULT 0
)
";

/// Index for a customer's quotes.
pub const CREATE_QUOTE_CUSTOMER_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_quotes_customer ON quotes(customer_id, quote_date DESC)
";

/// Index for a quote's lines.
pub const CREATE_QUOTE_ITEM_QUOTE_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_quote_items_quote ON quote_items(quote_id, sort_order)
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_COMPANIES_TABLE,
    CREATE_DEPARTMENTS_TABLE,
    CREATE_CUSTOMERS_TABLE,
    CREATE_OPPORTUNITIES_TABLE,
    CREATE_SCHEDULES_TABLE,
    CREATE_HISTORIES_TABLE,
    CREATE_DELIVERY_ITEMS_TABLE,
    CREATE_SCHEDULE_CUSTOMER_INDEX,
    CREATE_SCHEDULE_OPPORTUNITY_INDEX,
    CREATE_OPPORTUNITY_CUSTOMER_INDEX,
    CREATE_OPPORTUNITY_STAGE_INDEX,
    CREATE_HISTORY_SCHEDULE_INDEX,
    CREATE_ITEM_SCHEDULE_INDEX,
    CREATE_ITEM_HISTORY_INDEX,
    CREATE_METADATA_TABLE,
];

/// Quoting tables, added by schema version 3.
pub const QUOTING_STATEMENTS: &[&str] = &[
    CREATE_PRODUCTS_TABLE,
    CREATE_QUOTES_TABLE,
    CREATE_QUOTE_ITEMS_TABLE,
    CREATE_QUOTE_CUSTOMER_INDEX,
    CREATE_QUOTE_ITEM_QUOTE_INDEX,
];
