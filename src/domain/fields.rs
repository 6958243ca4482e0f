//! Airtable field names.

pub mod issue {
    pub const TITLE: &str = "Title";
    pub const DESCRIPTION: &str = "Description";
    pub const CATEGORY: &str = "Category";
    pub const SOURCE: &str = "Source";
    pub const RELATED_BILLS: &str = "Related_Bills";

    /// Free-text fields normalised by the cleanup job
    pub const TEXT_FIELDS: [&str; 3] = [TITLE, DESCRIPTION, SOURCE];
}

pub mod bill {
    pub const BILL_NAME: &str = "Bill_Name";
    pub const BILL_NUMBER: &str = "Bill_Number";
    pub const DIET_SESSION: &str = "Diet_Session";
    pub const STATUS: &str = "Status";
    pub const SUMMARY: &str = "Summary";
    pub const CATEGORY: &str = "Category";
    pub const QUALITY_SCORE: &str = "Quality_Score";

    pub const REQUIRED_FIELDS: [&str; 5] = [BILL_NAME, BILL_NUMBER, DIET_SESSION, STATUS, SUMMARY];
}
