mod test_session_over_relay;
mod test_ws_presence;
