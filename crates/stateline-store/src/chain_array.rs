use std::collections::VecDeque;

use stateline_proto::{Result, StatelineError};

use crate::state::{State, SwapType};

/// A single chain's in-memory bookkeeping: a bounded tail cache plus the
/// scalars the sampler reads every iteration without touching disk.
struct ChainCache {
    tail: VecDeque<State>,
    length: u64,
    sigma: f64,
    beta: f64,
    initialised: bool,
}

impl ChainCache {
    fn empty() -> Self {
        Self { tail: VecDeque::new(), length: 0, sigma: 1.0, beta: 1.0, initialised: false }
    }
}

/// Key layout: `chain_id` (u32 big-endian) then `sequence` (u64 big-endian),
/// so a per-chain prefix scan yields states in append order.
fn encode_key(chain_id: u32, sequence: u64) -> [u8; 12] {
    let mut key = [0u8; 12];
    key[0..4].copy_from_slice(&chain_id.to_be_bytes());
    key[4..12].copy_from_slice(&sequence.to_be_bytes());
    key
}

fn chain_prefix(chain_id: u32) -> [u8; 4] {
    chain_id.to_be_bytes()
}

/// The persisted, cached array of chain histories (spec §4.3).
///
/// Every `append_*` call writes through to `sled` immediately; the
/// in-memory tail is a read cache only, so evicting from it never loses
/// data that hasn't already reached disk.
pub struct ChainArray {
    db: sled::Db,
    cache_length: usize,
    chains: Vec<ChainCache>,
}

impl ChainArray {
    /// Opens (or creates) the database at `path` and allocates `ntotal`
    /// chains. If `recover_from_disk` is set, each chain's cache tail and
    /// counters are rebuilt from whatever is already on disk.
    pub fn open(
        path: &str,
        ntotal: usize,
        cache_length: usize,
        cache_size_mb: u64,
        recover_from_disk: bool,
    ) -> Result<Self> {
        let db = sled::Config::new()
            .path(path)
            .cache_capacity(cache_size_mb * 1024 * 1024)
            .open()
            .map_err(|e| StatelineError::Persistence { chain_id: 0, message: e.to_string() })?;

        let mut chains: Vec<ChainCache> = (0..ntotal).map(|_| ChainCache::empty()).collect();

        if recover_from_disk {
            for (i, cache) in chains.iter_mut().enumerate() {
                let chain_id = i as u32;
                let prefix = chain_prefix(chain_id);
                let mut length = 0u64;
                let mut tail = VecDeque::new();
                for entry in db.scan_prefix(prefix) {
                    let (_, value) = entry
                        .map_err(|e| StatelineError::Persistence { chain_id, message: e.to_string() })?;
                    let state: State = bincode::deserialize(&value).map_err(|e| {
                        StatelineError::Persistence { chain_id, message: e.to_string() }
                    })?;
                    length += 1;
                    tail.push_back(state);
                    while tail.len() > cache_length {
                        tail.pop_front();
                    }
                }
                if let Some(last) = tail.back() {
                    cache.sigma = last.sigma;
                    cache.beta = last.beta;
                    cache.initialised = true;
                }
                cache.length = length;
                cache.tail = tail;
            }
        }

        Ok(Self { db, cache_length, chains })
    }

    pub fn ntotal(&self) -> usize {
        self.chains.len()
    }

    fn cache(&self, i: usize) -> Result<&ChainCache> {
        self.chains
            .get(i)
            .ok_or_else(|| StatelineError::Config(format!("no such chain: {i}")))
    }

    fn cache_mut(&mut self, i: usize) -> Result<&mut ChainCache> {
        self.chains
            .get_mut(i)
            .ok_or_else(|| StatelineError::Config(format!("no such chain: {i}")))
    }

    fn persist(&self, chain_id: u32, sequence: u64, state: &State) -> Result<()> {
        let key = encode_key(chain_id, sequence);
        let bytes = bincode::serialize(state)
            .map_err(|e| StatelineError::Persistence { chain_id, message: e.to_string() })?;
        self.db
            .insert(key, bytes)
            .map_err(|e| StatelineError::Persistence { chain_id, message: e.to_string() })?;
        self.db
            .flush()
            .map_err(|e| StatelineError::Persistence { chain_id, message: e.to_string() })?;
        Ok(())
    }

    fn push(&mut self, i: usize, state: State) -> Result<State> {
        let chain_id = i as u32;
        let sequence = self.cache(i)?.length;
        self.persist(chain_id, sequence, &state)?;

        let cache_length = self.cache_length;
        let cache = self.cache_mut(i)?;
        cache.length += 1;
        cache.tail.push_back(state.clone());
        while cache.tail.len() > cache_length {
            cache.tail.pop_front();
        }
        Ok(state)
    }

    /// Seeds chain `i` with its first state. May only be called once per
    /// chain; a second call is a configuration error (spec §3).
    pub fn initialise(&mut self, i: usize, sample: Vec<f64>, energy: f64, sigma: f64, beta: f64) -> Result<()> {
        if self.cache(i)?.initialised {
            return Err(StatelineError::Config(format!("chain {i} already initialised")));
        }
        let state = State::new(sample, energy, sigma, beta, true, SwapType::NoAttempt);
        self.push(i, state)?;
        let cache = self.cache_mut(i)?;
        cache.sigma = sigma;
        cache.beta = beta;
        cache.initialised = true;
        Ok(())
    }

    /// Appends the outcome of an ordinary Metropolis step.
    pub fn append_step(&mut self, i: usize, sample: Vec<f64>, energy: f64, accepted: bool) -> Result<State> {
        let (sigma, beta) = {
            let cache = self.cache(i)?;
            (cache.sigma, cache.beta)
        };
        let state = State::new(sample, energy, sigma, beta, accepted, SwapType::NoAttempt);
        self.push(i, state)
    }

    /// Appends the outcome of a swap attempt. `accepted` tracks
    /// `swap_type == Accept` so the global accepted-implies-unchanged
    /// invariant holds uniformly across step and swap appends.
    pub fn append_swap(&mut self, i: usize, sample: Vec<f64>, energy: f64, swap_type: SwapType) -> Result<State> {
        let (sigma, beta) = {
            let cache = self.cache(i)?;
            (cache.sigma, cache.beta)
        };
        let accepted = swap_type == SwapType::Accept;
        let state = State::new(sample, energy, sigma, beta, accepted, swap_type);
        self.push(i, state)
    }

    pub fn set_sigma(&mut self, i: usize, sigma: f64) -> Result<()> {
        self.cache_mut(i)?.sigma = sigma;
        Ok(())
    }

    pub fn set_beta(&mut self, i: usize, beta: f64) -> Result<()> {
        self.cache_mut(i)?.beta = beta;
        Ok(())
    }

    pub fn sigma(&self, i: usize) -> Result<f64> {
        Ok(self.cache(i)?.sigma)
    }

    pub fn beta(&self, i: usize) -> Result<f64> {
        Ok(self.cache(i)?.beta)
    }

    pub fn length(&self, i: usize) -> Result<u64> {
        Ok(self.cache(i)?.length)
    }

    pub fn last_state(&self, i: usize) -> Result<State> {
        let cache = self.cache(i)?;
        cache
            .tail
            .back()
            .cloned()
            .ok_or_else(|| StatelineError::Config(format!("chain {i} has no states yet")))
    }

    /// Returns states `burnin..` thinned by keeping every `thin`-th entry.
    /// Falls back to disk for any state that has already been evicted from
    /// the tail cache.
    pub fn states(&self, i: usize, burnin: usize, thin: usize) -> Result<Vec<State>> {
        let thin = thin.max(1);
        let chain_id = i as u32;
        let length = self.length(i)? as usize;
        if burnin >= length {
            return Ok(Vec::new());
        }

        let cache = self.cache(i)?;
        let cached_from = length.saturating_sub(cache.tail.len());

        let mut out = Vec::new();
        let mut seq = burnin;
        while seq < length {
            if seq >= cached_from {
                let idx = seq - cached_from;
                out.push(cache.tail[idx].clone());
            } else {
                let key = encode_key(chain_id, seq as u64);
                let bytes = self
                    .db
                    .get(key)
                    .map_err(|e| StatelineError::Persistence { chain_id, message: e.to_string() })?
                    .ok_or_else(|| StatelineError::Persistence {
                        chain_id,
                        message: format!("missing sequence {seq}"),
                    })?;
                let state: State = bincode::deserialize(&bytes)
                    .map_err(|e| StatelineError::Persistence { chain_id, message: e.to_string() })?;
                out.push(state);
            }
            seq += thin;
        }
        Ok(out)
    }

    /// The coldest chain's samples for stack `s` (`mcmc.py::ChainArray.samples`:
    /// delegates to `states(s * nchains, burnin, thin)` and projects out the
    /// sample vectors). `nchains` is the stack width this array was opened
    /// with.
    pub fn cold_samples(&self, s: usize, nchains: usize, burnin: usize, thin: usize) -> Result<Vec<Vec<f64>>> {
        let coldest = s * nchains;
        Ok(self.states(coldest, burnin, thin)?.into_iter().map(|state| state.sample).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_tmp(ntotal: usize) -> (ChainArray, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db");
        let array = ChainArray::open(path.to_str().unwrap(), ntotal, 4, 1, false).unwrap();
        (array, dir)
    }

    #[test]
    fn initialise_then_append_increments_length() {
        let (mut array, _dir) = open_tmp(1);
        array.initialise(0, vec![0.0], 1.0, 1.0, 1.0).unwrap();
        assert_eq!(array.length(0).unwrap(), 1);
        array.append_step(0, vec![1.0], 0.5, true).unwrap();
        assert_eq!(array.length(0).unwrap(), 2);
    }

    #[test]
    fn double_initialise_is_a_config_error() {
        let (mut array, _dir) = open_tmp(1);
        array.initialise(0, vec![0.0], 1.0, 1.0, 1.0).unwrap();
        let err = array.initialise(0, vec![0.0], 1.0, 1.0, 1.0).unwrap_err();
        assert!(matches!(err, StatelineError::Config(_)));
    }

    #[test]
    fn rejected_step_does_not_change_sample() {
        let (mut array, _dir) = open_tmp(1);
        array.initialise(0, vec![2.0], 1.0, 1.0, 1.0).unwrap();
        let rejected = array.append_step(0, vec![2.0], 1.0, false).unwrap();
        assert!(!rejected.accepted);
        assert_eq!(rejected.sample, vec![2.0]);
    }

    #[test]
    fn swap_accept_sets_accepted_flag() {
        let (mut array, _dir) = open_tmp(2);
        array.initialise(0, vec![0.0], 1.0, 1.0, 1.0).unwrap();
        array.initialise(1, vec![1.0], 2.0, 1.0, 0.5).unwrap();
        let swapped = array.append_swap(0, vec![1.0], 2.0, SwapType::Accept).unwrap();
        assert!(swapped.accepted);
        assert_eq!(swapped.swap_type, SwapType::Accept);
    }

    #[test]
    fn states_survives_cache_eviction() {
        let (mut array, _dir) = open_tmp(1);
        array.initialise(0, vec![0.0], 1.0, 1.0, 1.0).unwrap();
        for k in 1..20 {
            array.append_step(0, vec![k as f64], k as f64, true).unwrap();
        }
        let all = array.states(0, 0, 1).unwrap();
        assert_eq!(all.len(), 20);
        assert_eq!(all[0].sample, vec![0.0]);
        assert_eq!(all[19].sample, vec![19.0]);
    }

    #[test]
    fn states_applies_burnin_and_thinning() {
        let (mut array, _dir) = open_tmp(1);
        array.initialise(0, vec![0.0], 1.0, 1.0, 1.0).unwrap();
        for k in 1..10 {
            array.append_step(0, vec![k as f64], k as f64, true).unwrap();
        }
        let thinned = array.states(0, 2, 3).unwrap();
        let samples: Vec<f64> = thinned.iter().map(|s| s.sample[0]).collect();
        assert_eq!(samples, vec![2.0, 5.0, 8.0]);
    }

    #[test]
    fn cold_samples_reads_the_stacks_coldest_chain() {
        let (mut array, _dir) = open_tmp(4); // nstacks=2, nchains=2
        array.initialise(0, vec![0.0], 1.0, 1.0, 1.0).unwrap();
        array.initialise(1, vec![100.0], 1.0, 1.0, 0.5).unwrap();
        array.initialise(2, vec![1.0], 1.0, 1.0, 1.0).unwrap();
        array.initialise(3, vec![200.0], 1.0, 1.0, 0.5).unwrap();
        array.append_step(2, vec![2.0], 0.5, true).unwrap();
        let samples = array.cold_samples(1, 2, 0, 1).unwrap();
        assert_eq!(samples, vec![vec![1.0], vec![2.0]]);
    }

    #[test]
    fn recover_from_disk_rebuilds_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db");
        {
            let mut array = ChainArray::open(path.to_str().unwrap(), 1, 4, 1, false).unwrap();
            array.initialise(0, vec![0.0], 1.0, 1.0, 1.0).unwrap();
            array.append_step(0, vec![1.0], 0.5, true).unwrap();
        }
        let recovered = ChainArray::open(path.to_str().unwrap(), 1, 4, 1, true).unwrap();
        assert_eq!(recovered.length(0).unwrap(), 2);
        assert_eq!(recovered.last_state(0).unwrap().sample, vec![1.0]);
    }
}
