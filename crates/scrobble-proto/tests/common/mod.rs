pub mod mock_lastfm;
