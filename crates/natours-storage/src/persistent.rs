use crate::journal::{Journal, Record};
use crate::mem::InMemoryStore;
use crate::traits::TourStore;
use natours_core::{Result, Tour, TourError, TourInput, TourQuery};
use parking_lot::Mutex;
use std::path::Path;
use tracing::info;

/// Tours held in memory and journaled to disk. Every mutation is written to
/// the journal before it becomes visible.
pub struct FileStore {
    mem: InMemoryStore,
    journal: Mutex<Journal>,
}

impl FileStore {
    /// Replays the journal in `data_dir`. When replay saw more records than
    /// there are live tours, the journal is rewritten to one record per tour.
    pub fn open(data_dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let (mut journal, records) = Journal::open(data_dir.as_ref())?;
        let mem = InMemoryStore::new();
        let replayed = records.len();
        mem.write(|inner| {
            for rec in records {
                match rec {
                    Record::Put { tour } => inner.put(tour),
                    Record::PutMany { tours } => {
                        for t in tours {
                            inner.put(t);
                        }
                    }
                    Record::Delete { id } => {
                        inner.remove(&id);
                    }
                }
            }
        });
        let live = mem.all_tours();
        info!(
            path = %journal.path().display(),
            records = replayed,
            tours = live.len(),
            "journal replayed"
        );
        if replayed > live.len() {
            journal.compact(&live)?;
            info!(bytes = journal.committed_len(), "journal compacted");
        }
        Ok(Self {
            mem,
            journal: Mutex::new(journal),
        })
    }

    fn log(&self, rec: &Record) -> Result<()> {
        self.journal
            .lock()
            .append(rec)
            .map_err(|e| TourError::StoreUnavailable(e.to_string()))
    }
}

#[async_trait::async_trait]
impl TourStore for FileStore {
    async fn find(&self, query: &TourQuery) -> Result<Vec<Tour>> {
        self.mem.find(query).await
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Tour>> {
        self.mem.find_by_id(id).await
    }

    async fn create(&self, input: TourInput) -> Result<Tour> {
        self.mem.write(|inner| {
            let tour = inner.prepare_create(input)?;
            self.log(&Record::Put { tour: tour.clone() })?;
            inner.put(tour.clone());
            Ok(tour)
        })
    }

    async fn create_many(&self, inputs: Vec<TourInput>) -> Result<Vec<Tour>> {
        self.mem.write(|inner| {
            let tours = inner.prepare_create_many(inputs)?;
            self.log(&Record::PutMany {
                tours: tours.clone(),
            })?;
            for t in tours.iter() {
                inner.put(t.clone());
            }
            Ok(tours)
        })
    }

    async fn update_by_id(&self, id: &str, patch: TourInput) -> Result<Option<Tour>> {
        self.mem.write(|inner| {
            let Some(updated) = inner.prepare_update(id, &patch)? else {
                return Ok(None);
            };
            self.log(&Record::Put {
                tour: updated.clone(),
            })?;
            inner.put(updated.clone());
            Ok(Some(updated))
        })
    }

    async fn delete_by_id(&self, id: &str) -> Result<Option<Tour>> {
        self.mem.write(|inner| {
            if !inner.contains(id) {
                return Ok(None);
            }
            self.log(&Record::Delete { id: id.to_string() })?;
            Ok(inner.remove(id))
        })
    }

    async fn delete_all(&self) -> Result<u64> {
        self.mem.write(|inner| {
            self.journal
                .lock()
                .reset()
                .map_err(|e| TourError::StoreUnavailable(e.to_string()))?;
            Ok(inner.clear())
        })
    }

    async fn count(&self) -> Result<usize> {
        self.mem.count().await
    }

    fn backend(&self) -> &'static str {
        "file"
    }
}
