pub const DEFAULT_ROOT: &str = "https://seller-analytics-api.wildberries.ru";

pub const REMAINS_PATH: &str = "/api/v1/warehouse_remains";

/// Query sent with every report request; identical for all cabinets.
pub const REPORT_PARAMS: &[(&str, &str)] = &[
    ("locale", "ru"),
    ("groupByBrand", "false"),
    ("groupBySubject", "false"),
    ("groupBySa", "true"),
    ("groupByNm", "true"),
    ("groupByBarcode", "true"),
    ("groupBySize", "true"),
    ("filterPics", "0"),
    ("filterVolume", "0"),
];
