use common::{PageRequest, UserId};
use domain::{Money, Order, OrderStatus, PaymentStatus, ProductCategory};
use serde::{Deserialize, Serialize};

/// Column a product listing is sorted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProductSort {
    #[default]
    CreatedAt,
    Price,
    Rating,
    Name,
}

impl std::str::FromStr for ProductSort {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "createdAt" => Ok(ProductSort::CreatedAt),
            "price" => Ok(ProductSort::Price),
            "rating" => Ok(ProductSort::Rating),
            "name" => Ok(ProductSort::Name),
            other => Err(format!("Invalid sort field: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl std::str::FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(format!("Invalid sort order: {other}")),
        }
    }
}

/// Builder for constructing product queries.
///
/// `search` is a case-insensitive substring match on the product name.
#[derive(Debug, Clone, Default)]
pub struct ProductQuery {
    pub category: Option<ProductCategory>,
    pub min_price: Option<Money>,
    pub max_price: Option<Money>,
    pub search: Option<String>,
    pub featured: Option<bool>,
    pub sort_by: ProductSort,
    pub sort_order: SortOrder,
    pub page: PageRequest,
}

impl ProductQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn category(mut self, category: ProductCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn min_price(mut self, price: Money) -> Self {
        self.min_price = Some(price);
        self
    }

    pub fn max_price(mut self, price: Money) -> Self {
        self.max_price = Some(price);
        self
    }

    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.search = Some(term.into());
        self
    }

    pub fn featured(mut self, featured: bool) -> Self {
        self.featured = Some(featured);
        self
    }

    pub fn sort(mut self, sort_by: ProductSort, sort_order: SortOrder) -> Self {
        self.sort_by = sort_by;
        self.sort_order = sort_order;
        self
    }

    pub fn page(mut self, page: PageRequest) -> Self {
        self.page = page;
        self
    }
}

/// Builder for constructing order queries. Results are newest first.
///
/// `search` matches the order number, or the owner's name or e-mail, as a
/// case-insensitive substring.
#[derive(Debug, Clone, Default)]
pub struct OrderQuery {
    pub user_id: Option<UserId>,
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub search: Option<String>,
    pub page: PageRequest,
}

impl OrderQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a query for one user's orders.
    pub fn for_user(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            ..Default::default()
        }
    }

    pub fn status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn payment_status(mut self, payment_status: PaymentStatus) -> Self {
        self.payment_status = Some(payment_status);
        self
    }

    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.search = Some(term.into());
        self
    }

    pub fn page(mut self, page: PageRequest) -> Self {
        self.page = page;
        self
    }
}

/// Order counts per status and revenue over non-cancelled orders.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStats {
    pub total: u64,
    pub pending: u64,
    pub processing: u64,
    pub shipped: u64,
    pub delivered: u64,
    pub cancelled: u64,
    pub total_revenue: Money,
}

impl OrderStats {
    /// Adds `count` orders of `status` worth `amount` in total.
    pub fn add(&mut self, status: OrderStatus, count: u64, amount: Money) {
        self.total += count;
        match status {
            OrderStatus::Pending => self.pending += count,
            OrderStatus::Processing => self.processing += count,
            OrderStatus::Shipped => self.shipped += count,
            OrderStatus::Delivered => self.delivered += count,
            OrderStatus::Cancelled => self.cancelled += count,
        }
        if status != OrderStatus::Cancelled {
            self.total_revenue = self.total_revenue.saturating_add(amount);
        }
    }

    pub fn record(&mut self, order: &Order) {
        self.add(order.status(), 1, order.total_amount());
    }
}

/// Escapes `%`, `_` and `\` so user input matches literally inside LIKE.
pub(crate) fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

pub(crate) fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_exclude_cancelled_revenue() {
        let mut stats = OrderStats::default();
        stats.add(OrderStatus::Pending, 2, Money::from_cents(5_000));
        stats.add(OrderStatus::Cancelled, 1, Money::from_cents(9_999));
        stats.add(OrderStatus::Delivered, 1, Money::from_cents(1_000));

        assert_eq!(stats.total, 4);
        assert_eq!(stats.pending, 2);
        assert_eq!(stats.cancelled, 1);
        assert_eq!(stats.total_revenue.cents(), 6_000);
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(like_pattern("phone"), "%phone%");
    }

    #[test]
    fn sort_parsing() {
        assert_eq!("price".parse::<ProductSort>().unwrap(), ProductSort::Price);
        assert_eq!("asc".parse::<SortOrder>().unwrap(), SortOrder::Asc);
        assert!("popularity".parse::<ProductSort>().is_err());
    }

    #[test]
    fn builders_compose() {
        let user_id = UserId::new();
        let query = OrderQuery::for_user(user_id)
            .status(OrderStatus::Shipped)
            .page(PageRequest::new(2, 5));
        assert_eq!(query.user_id, Some(user_id));
        assert_eq!(query.status, Some(OrderStatus::Shipped));
        assert_eq!(query.page.offset(), 5);
    }
}
