mod test_stores_concurrency;
