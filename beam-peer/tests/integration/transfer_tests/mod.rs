pub mod test_file_sent_after_receiver_closes;
pub mod test_happy_path_transfer;
pub mod test_header_before_channel_open;
pub mod test_zero_byte_transfer;
