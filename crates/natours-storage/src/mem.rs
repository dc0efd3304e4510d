use crate::eval::{sort_cmp, CompiledFilter};
use crate::traits::TourStore;
use chrono::Utc;
use natours_core::{new_tour_id, Result, Tour, TourError, TourId, TourInput, TourQuery};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use prometheus::{register_histogram, Histogram};
use std::collections::HashMap;
use std::sync::Arc;

static STORE_FIND_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!("store_find_seconds", "Tour find latency")
        .expect("store_find_seconds registers once")
});

#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Inner>>,
}

#[derive(Default)]
pub(crate) struct Inner {
    // id -> (insertion seq, tour); seq breaks sort ties
    tours: HashMap<TourId, (u64, Tour)>,
    next_seq: u64,
}

impl Inner {
    fn name_taken(&self, name: &str, except: Option<&str>) -> bool {
        self.tours
            .values()
            .any(|(_, t)| t.name == name && Some(t.id.as_str()) != except)
    }

    pub(crate) fn prepare_create(&self, input: TourInput) -> Result<Tour> {
        let tour = Tour::from_input(new_tour_id(), input, Utc::now())?;
        if self.name_taken(&tour.name, None) {
            return Err(TourError::Duplicate(tour.name));
        }
        Ok(tour)
    }

    pub(crate) fn prepare_create_many(&self, inputs: Vec<TourInput>) -> Result<Vec<Tour>> {
        let mut out: Vec<Tour> = Vec::with_capacity(inputs.len());
        for input in inputs {
            let tour = self.prepare_create(input)?;
            if out.iter().any(|t| t.name == tour.name) {
                return Err(TourError::Duplicate(tour.name));
            }
            out.push(tour);
        }
        Ok(out)
    }

    pub(crate) fn prepare_update(&self, id: &str, patch: &TourInput) -> Result<Option<Tour>> {
        let Some((_, current)) = self.tours.get(id) else {
            return Ok(None);
        };
        let updated = current.apply_patch(patch)?;
        if self.name_taken(&updated.name, Some(id)) {
            return Err(TourError::Duplicate(updated.name));
        }
        Ok(Some(updated))
    }

    /// Inserts or replaces; a replaced tour keeps its insertion order.
    pub(crate) fn put(&mut self, tour: Tour) {
        if let Some(slot) = self.tours.get_mut(&tour.id) {
            slot.1 = tour;
            return;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.tours.insert(tour.id.clone(), (seq, tour));
    }

    pub(crate) fn remove(&mut self, id: &str) -> Option<Tour> {
        self.tours.remove(id).map(|(_, t)| t)
    }

    pub(crate) fn clear(&mut self) -> u64 {
        let n = self.tours.len() as u64;
        self.tours.clear();
        n
    }

    pub(crate) fn contains(&self, id: &str) -> bool {
        self.tours.contains_key(id)
    }

    fn find(&self, query: &TourQuery) -> Result<Vec<Tour>> {
        let _timer = STORE_FIND_SECONDS.start_timer();
        let filter = CompiledFilter::compile(&query.filter)?;
        let mut hits: Vec<&(u64, Tour)> = self
            .tours
            .values()
            .filter(|(_, t)| filter.matches(t))
            .collect();
        hits.sort_by(|(sa, a), (sb, b)| sort_cmp(a, b, &query.sort).then(sa.cmp(sb)));
        let (skip, limit) = match query.page {
            Some(p) => (p.skip, p.limit),
            None => (0, usize::MAX),
        };
        Ok(hits
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|(_, t)| t.clone())
            .collect())
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn read<R>(&self, f: impl FnOnce(&Inner) -> R) -> R {
        f(&self.inner.read())
    }

    pub(crate) fn write<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> R {
        f(&mut self.inner.write())
    }

    /// Snapshot of every stored tour in insertion order.
    pub fn all_tours(&self) -> Vec<Tour> {
        self.read(|inner| {
            let mut all: Vec<&(u64, Tour)> = inner.tours.values().collect();
            all.sort_by_key(|(seq, _)| *seq);
            all.into_iter().map(|(_, t)| t.clone()).collect()
        })
    }
}

#[async_trait::async_trait]
impl TourStore for InMemoryStore {
    async fn find(&self, query: &TourQuery) -> Result<Vec<Tour>> {
        self.read(|inner| inner.find(query))
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Tour>> {
        Ok(self.read(|inner| inner.tours.get(id).map(|(_, t)| t.clone())))
    }

    async fn create(&self, input: TourInput) -> Result<Tour> {
        self.write(|inner| {
            let tour = inner.prepare_create(input)?;
            inner.put(tour.clone());
            Ok(tour)
        })
    }

    async fn create_many(&self, inputs: Vec<TourInput>) -> Result<Vec<Tour>> {
        self.write(|inner| {
            let tours = inner.prepare_create_many(inputs)?;
            for t in tours.iter() {
                inner.put(t.clone());
            }
            Ok(tours)
        })
    }

    async fn update_by_id(&self, id: &str, patch: TourInput) -> Result<Option<Tour>> {
        self.write(|inner| {
            let updated = inner.prepare_update(id, &patch)?;
            if let Some(t) = &updated {
                inner.put(t.clone());
            }
            Ok(updated)
        })
    }

    async fn delete_by_id(&self, id: &str) -> Result<Option<Tour>> {
        Ok(self.write(|inner| inner.remove(id)))
    }

    async fn delete_all(&self) -> Result<u64> {
        Ok(self.write(|inner| inner.clear()))
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.read(|inner| inner.tours.len()))
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
