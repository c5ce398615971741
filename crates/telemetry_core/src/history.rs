//! Histórico rolante de amostras para gráficos.
//!
//! Buffer FIFO de capacidade fixa, em ordem de chegada (não reordena por
//! `timestamp`). Leitores recebem cópias, nunca referências vivas.

use crate::types::Sample;
use std::collections::VecDeque;

/// Capacidade padrão do histórico.
pub const HISTORY_SIZE: usize = 30;

/// Buffer de histórico com capacidade fixa.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    samples: VecDeque<Sample>,
    capacity: usize,
}

impl HistoryBuffer {
    /// Cria um buffer vazio. Capacidade mínima é 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Adiciona no fim, descartando as mais antigas se passar da capacidade.
    pub fn append(&mut self, sample: Sample) {
        self.samples.push_back(sample);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    /// Cópia da sequência atual, da mais antiga para a mais recente.
    pub fn snapshot(&self) -> Vec<Sample> {
        self.samples.iter().copied().collect()
    }

    pub fn latest(&self) -> Option<&Sample> {
        self.samples.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self::new(HISTORY_SIZE)
    }
}
