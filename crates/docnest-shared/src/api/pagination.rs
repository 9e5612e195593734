use serde::{Deserialize, Serialize};

/// `page` is 1-based; a non-positive `size` disables the limit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PaginationParams {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_size")]
    pub size: i64,
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self {
            page: default_page(),
            size: default_size(),
        }
    }
}

fn default_page() -> i64 {
    1
}

fn default_size() -> i64 {
    -1
}

impl PaginationParams {
    pub fn offset(&self) -> i64 {
        if self.size > 0 {
            (self.page.max(1) - 1).saturating_mul(self.size)
        } else {
            0
        }
    }

    pub fn limit(&self) -> Option<i64> {
        (self.size > 0).then_some(self.size)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub size: i64,
}
