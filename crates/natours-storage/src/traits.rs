use natours_core::{Result, Tour, TourInput, TourQuery};

/// Document collection holding tours. Implementations validate on write and
/// enforce name uniqueness.
#[async_trait::async_trait]
pub trait TourStore: Send + Sync + 'static {
    async fn find(&self, query: &TourQuery) -> Result<Vec<Tour>>;
    async fn find_by_id(&self, id: &str) -> Result<Option<Tour>>;
    async fn create(&self, input: TourInput) -> Result<Tour>;
    /// All-or-nothing: either every input is stored or none is.
    async fn create_many(&self, inputs: Vec<TourInput>) -> Result<Vec<Tour>>;
    /// Returns `None` when no tour has this id.
    async fn update_by_id(&self, id: &str, patch: TourInput) -> Result<Option<Tour>>;
    /// Returns the removed tour, if there was one.
    async fn delete_by_id(&self, id: &str) -> Result<Option<Tour>>;
    async fn delete_all(&self) -> Result<u64>;
    async fn count(&self) -> Result<usize>;

    /// Short backend label for logs.
    fn backend(&self) -> &'static str;
}
