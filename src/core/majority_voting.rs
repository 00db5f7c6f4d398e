use crate::core::ds_fusion::check_geometry;
use crate::core::region::process_row_blocks;
use crate::types::{ClassLabel, FusionError, FusionResult, LabelImage, LabelImageView};
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

/// Majority voting parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VotingParams<L> {
    /// Votes ignored by the count, and label written when every vote is ignored
    pub no_data_label: L,
    /// Label written when several classes share the largest count
    pub undecided_label: L,
    pub use_mask: bool,
    pub chunk_rows: Option<usize>,
}

impl<L: Default> Default for VotingParams<L> {
    fn default() -> Self {
        Self {
            no_data_label: L::default(),
            undecided_label: L::default(),
            use_mask: false,
            chunk_rows: None,
        }
    }
}

/// Fusion of classification maps by plain majority voting
pub struct MajorityVotingFilter<L> {
    params: VotingParams<L>,
}

impl<L: ClassLabel> MajorityVotingFilter<L> {
    pub fn new(params: VotingParams<L>) -> Self {
        Self { params }
    }

    /// Winning label of one pixel, reusing `tally` between calls
    pub fn vote(&self, votes: &[L], tally: &mut Vec<(L, usize)>) -> L {
        tally.clear();
        for vote in votes.iter().filter(|v| **v != self.params.no_data_label) {
            match tally.iter_mut().find(|(label, _)| label == vote) {
                Some((_, count)) => *count += 1,
                None => tally.push((vote.clone(), 1)),
            }
        }

        let best = match tally.iter().map(|(_, count)| *count).max() {
            Some(best) => best,
            None => return self.params.no_data_label.clone(),
        };

        let mut winners = tally.iter().filter(|(_, count)| *count == best);
        match (winners.next(), winners.next()) {
            (Some((label, _)), None) => label.clone(),
            _ => self.params.undecided_label.clone(),
        }
    }

    pub fn apply(
        &self,
        inputs: &[LabelImageView<'_, L>],
        mask: Option<ArrayView2<'_, u8>>,
    ) -> FusionResult<LabelImage<L>> {
        let shape = inputs.first().map(|image| image.dim()).ok_or_else(|| {
            FusionError::InvalidConfiguration(
                "At least one classification map is required".to_string(),
            )
        })?;

        let mut output = Array2::from_elem(shape, self.params.no_data_label.clone());
        check_geometry(inputs, mask.as_ref(), shape, self.params.use_mask)?;

        log::info!(
            "Majority voting of {} classification maps ({}x{})",
            inputs.len(),
            shape.0,
            shape.1
        );

        let mask = if self.params.use_mask { mask } else { None };
        process_row_blocks(
            inputs,
            mask.as_ref(),
            &mut output,
            self.params.chunk_rows,
            &self.params.no_data_label,
            Vec::new,
            |tally, votes| self.vote(votes, tally),
        );

        Ok(output)
    }
}
