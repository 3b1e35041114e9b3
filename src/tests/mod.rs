mod test_flush_protocol;
