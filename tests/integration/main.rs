mod mock_chain;
mod round_cycle;
